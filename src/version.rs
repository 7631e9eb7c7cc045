//! Schema version tags and their ordering.
//!
//! Tags are dotted numeric strings (`1.7.7`, `0.8`, `3.1.0-beta`). Missing
//! trailing components compare as zero, so `0.8` and `0.8.0` are equal, and a
//! pre-release suffix sorts before the plain release. Build metadata after
//! `+` is accepted and ignored for ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::RulesError;

#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    pre: Option<String>,
}

impl Version {
    pub fn parse(tag: &str) -> Result<Self, RulesError> {
        let tag = tag.trim();
        let tag = tag.strip_prefix('v').unwrap_or(tag);
        if tag.is_empty() {
            return Err(RulesError::InvalidVersion("empty version tag".to_string()));
        }
        let release = match tag.split_once('+') {
            Some((release, build)) if !build.is_empty() && !release.is_empty() => release,
            Some(_) => return Err(RulesError::InvalidVersion(tag.to_string())),
            None => tag,
        };
        let (core, pre) = match release.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(RulesError::InvalidVersion(tag.to_string())),
            None => (tag, None),
        };
        let parts = core
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RulesError::InvalidVersion(tag.to_string()))?;
        Ok(Self { parts, pre })
    }

    fn part(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.parts.len().max(other.parts.len());
        for idx in 0..width {
            match self.part(idx).cmp(&other.part(idx)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", core.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

/// True when `candidate` orders strictly after `baseline`.
pub fn is_newer(candidate: &str, baseline: &str) -> Result<bool, RulesError> {
    Ok(Version::parse(candidate)? > Version::parse(baseline)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_tags_pad_with_zero() {
        assert_eq!(Version::parse("0.8").unwrap(), Version::parse("0.8.0").unwrap());
        assert!(!is_newer("0.8", "0.8.0").unwrap());
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        assert!(is_newer("1.10.0", "1.9.9").unwrap());
        assert!(is_newer("2.0.0", "1.7.7").unwrap());
        assert!(!is_newer("1.7.7", "2.0.0").unwrap());
    }

    #[test]
    fn test_prerelease_sorts_first() {
        assert!(is_newer("3.1.0", "3.1.0-beta").unwrap());
        assert!(!is_newer("3.1.0-beta", "3.1.0").unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("one.two").is_err());
        assert!(Version::parse("1.0-").is_err());
    }

    #[test]
    fn test_build_metadata_is_ignored() {
        assert_eq!(
            Version::parse("3.1.0+build.5").unwrap(),
            Version::parse("3.1.0").unwrap()
        );
        assert!(!is_newer("3.1.0", "3.1.0+build.5").unwrap());
        assert!(is_newer("3.1.0", "3.0.0+build.5").unwrap());
        assert!(!is_newer("3.1.0-rc1+b7", "3.1.0").unwrap());
        assert_eq!(Version::parse("3.1.0-rc1+b7").unwrap().to_string(), "3.1.0-rc1");
        assert!(Version::parse("3.1.0+").is_err());
        assert!(Version::parse("+build").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(Version::parse("v3.1.0-rc1").unwrap().to_string(), "3.1.0-rc1");
    }
}

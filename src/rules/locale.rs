//! Locale keys emitted by the rules core.
//!
//! Nothing here resolves text; a [`crate::host::Localizer`] turns keys into
//! display strings at render time.

use std::borrow::Cow;
use std::fmt;

use super::types::{Affliction, Attribute};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocaleKey(Cow<'static, str>);

impl LocaleKey {
    pub const fn fixed(key: &'static str) -> Self {
        LocaleKey(Cow::Borrowed(key))
    }

    pub fn owned(key: String) -> Self {
        LocaleKey(Cow::Owned(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocaleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const TALENT_ATTACK_BOONS_BANES: LocaleKey = LocaleKey::fixed("DL.TalentAttackBoonsBanes");
pub const TALENT_CHALLENGE_BOONS_BANES: LocaleKey =
    LocaleKey::fixed("DL.TalentChallengeBoonsBanes");
pub const TALENT_EXTRA_DAMAGE: LocaleKey = LocaleKey::fixed("DL.TalentExtraDamage");
pub const TALENT_EXTRA_DAMAGE_20_PLUS: LocaleKey = LocaleKey::fixed("DL.TalentExtraDamage20plus");
pub const TALENT_VS_BOONS_BANES: LocaleKey = LocaleKey::fixed("DL.TalentVSBoonsBanes");
pub const TALENT_VS_DAMAGE: LocaleKey = LocaleKey::fixed("DL.TalentVSDamage");
pub const TALENT_HEALING: LocaleKey = LocaleKey::fixed("DL.TalentHealing");
pub const TALENT_DAMAGE: LocaleKey = LocaleKey::fixed("DL.TalentDamage");
pub const TALENT_BONUS_DEFENSE: LocaleKey = LocaleKey::fixed("DL.TalentBonusesDefense");
pub const TALENT_BONUS_HEALTH: LocaleKey = LocaleKey::fixed("DL.TalentBonusesHealth");
pub const TALENT_BONUS_SPEED: LocaleKey = LocaleKey::fixed("DL.TalentBonusesSpeed");
pub const TALENT_BONUS_POWER: LocaleKey = LocaleKey::fixed("DL.TalentBonusesPower");

/// Label key for an affliction or action-state name, e.g. `DL.stunned`.
pub fn condition_label(name: &str) -> LocaleKey {
    LocaleKey::owned(format!("DL.{}", name))
}

pub fn attribute_label(attribute: Attribute) -> LocaleKey {
    LocaleKey::fixed(match attribute {
        Attribute::Strength => "DL.AttributeStrength",
        Attribute::Agility => "DL.AttributeAgility",
        Attribute::Intellect => "DL.AttributeIntellect",
        Attribute::Will => "DL.AttributeWill",
        Attribute::Perception => "DL.AttributePerception",
    })
}

const DEFAULT_WARNINGS: &[(Affliction, &str)] = &[
    (Affliction::Blinded, "DL.DialogWarningBlindedChallengeFailer"),
    (Affliction::Dazed, "DL.DialogWarningDazedFailer"),
    (Affliction::Defenseless, "DL.DialogWarningDefenselessFailer"),
    (Affliction::Stunned, "DL.DialogWarningStunnedFailer"),
    (Affliction::Surprised, "DL.DialogWarningSurprisedFailer"),
    (Affliction::Unconscious, "DL.DialogWarningUnconsciousFailer"),
];

/// Affliction → warning message key, handed to the gate at construction.
#[derive(Debug, Clone, Copy)]
pub struct WarningTable {
    entries: &'static [(Affliction, &'static str)],
}

impl WarningTable {
    pub const fn new(entries: &'static [(Affliction, &'static str)]) -> Self {
        Self { entries }
    }

    pub fn warning_for(&self, affliction: Affliction) -> Option<LocaleKey> {
        self.entries
            .iter()
            .find(|(a, _)| *a == affliction)
            .map(|(_, key)| LocaleKey::fixed(*key))
    }
}

impl Default for WarningTable {
    fn default() -> Self {
        Self::new(DEFAULT_WARNINGS)
    }
}

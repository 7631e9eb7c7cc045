//! Affliction gate: decides whether a character's conditions block a roll,
//! and lists the boons/banes and damage modifiers in play.
//!
//! Every operation here is pure. Results carry locale keys and raw values;
//! [`EffectSummary::render_html`] is the only place text is produced.

use std::fmt::Write;
use std::str::FromStr;

use super::locale::{self, LocaleKey, WarningTable};
use super::types::{Affliction, Attribute, CharacterSheet, ModValue, RollModifiers, Talent};
use crate::errors::RulesError;
use crate::host::Localizer;

/// Outcome of a blocking check.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Clear,
    Blocked {
        affliction: Affliction,
        /// Warning message key for the caller to surface, if one is mapped.
        warning: Option<LocaleKey>,
    },
}

impl Gate {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Gate::Blocked { .. })
    }
}

/// Roll kinds that can receive condition boons/banes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Spell,
    Challenge,
    Attack,
}

impl ActionKind {
    fn boons_banes_label(self) -> LocaleKey {
        match self {
            ActionKind::Spell | ActionKind::Challenge => locale::TALENT_CHALLENGE_BOONS_BANES,
            ActionKind::Attack => locale::TALENT_ATTACK_BOONS_BANES,
        }
    }
}

impl FromStr for ActionKind {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SPELL" => Ok(ActionKind::Spell),
            "CHALLENGE" => Ok(ActionKind::Challenge),
            "ATTACK" => Ok(ActionKind::Attack),
            other => Err(RulesError::NotFound(format!("action kind '{}'", other))),
        }
    }
}

/// How much of a talent's configuration a summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalentScope {
    /// Attack-roll modifiers only (weapon and spell rolls using the talent).
    Roll,
    /// The talent itself was used: every configured block.
    Talent,
}

impl TalentScope {
    pub fn from_kind(kind: &str) -> Self {
        if kind == "TALENT" {
            TalentScope::Talent
        } else {
            TalentScope::Roll
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectLine {
    /// `<condition>: <boons/banes label>: <magnitude>`
    Condition {
        condition: LocaleKey,
        boons_banes: LocaleKey,
        magnitude: String,
    },
    /// `<label> (<attribute>): <value>`
    Modifier {
        label: LocaleKey,
        attribute: Option<LocaleKey>,
        value: String,
    },
}

impl EffectLine {
    fn modifier(label: LocaleKey, value: &ModValue) -> Self {
        EffectLine::Modifier {
            label,
            attribute: None,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectSummary {
    pub header: Option<String>,
    pub lines: Vec<EffectLine>,
}

impl EffectSummary {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Chat-card markup. A summary with no lines renders as an empty string,
    /// header included.
    pub fn render_html(&self, localizer: &dyn Localizer) -> String {
        let mut out = String::new();
        if self.is_empty() {
            return out;
        }
        if let Some(header) = &self.header {
            let _ = write!(out, "{}:<br>", escape_html(header));
        }
        for line in &self.lines {
            match line {
                EffectLine::Condition {
                    condition,
                    boons_banes,
                    magnitude,
                } => {
                    let _ = write!(
                        out,
                        "{}:<br>&nbsp;&nbsp;&nbsp;• {}: {}<br>",
                        escape_html(&localizer.localize(condition.as_str())),
                        escape_html(&localizer.localize(boons_banes.as_str())),
                        escape_html(magnitude)
                    );
                }
                EffectLine::Modifier {
                    label,
                    attribute,
                    value,
                } => {
                    let _ = write!(
                        out,
                        "&nbsp;&nbsp;&nbsp;• {}",
                        escape_html(&localizer.localize(label.as_str()))
                    );
                    if let Some(attribute) = attribute {
                        let _ = write!(
                            out,
                            " ({})",
                            escape_html(&localizer.localize(attribute.as_str()))
                        );
                    }
                    let _ = write!(out, ": {} <br>", escape_html(value));
                }
            }
        }
        out
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct AfflictionGate {
    warnings: WarningTable,
}

impl AfflictionGate {
    pub fn new(warnings: WarningTable) -> Self {
        Self { warnings }
    }

    /// First active affliction of `blocking`, in list order.
    pub fn is_blocked(&self, sheet: &CharacterSheet, blocking: &[Affliction]) -> Gate {
        blocking
            .iter()
            .copied()
            .find(|a| sheet.afflictions.is_active(*a))
            .map(|affliction| self.blocked(affliction))
            .unwrap_or(Gate::Clear)
    }

    /// Single-affliction check that only applies when `condition` holds.
    pub fn is_conditionally_blocked(
        &self,
        sheet: &CharacterSheet,
        affliction: Affliction,
        condition: bool,
    ) -> Gate {
        if condition && sheet.afflictions.is_active(affliction) {
            self.blocked(affliction)
        } else {
            Gate::Clear
        }
    }

    fn blocked(&self, affliction: Affliction) -> Gate {
        Gate::Blocked {
            affliction,
            warning: self.warnings.warning_for(affliction),
        }
    }

    /// Condition boons/banes for a roll of kind `kind` (`SPELL`, `CHALLENGE`
    /// or `ATTACK`); any other kind has no summary.
    pub fn build_action_effect_summary(
        &self,
        sheet: &CharacterSheet,
        kind: &str,
        effects: &[&str],
        magnitude: &str,
    ) -> Option<EffectSummary> {
        let kind = kind.parse::<ActionKind>().ok()?;
        Some(self.action_effect_summary(sheet, kind, effects, magnitude))
    }

    pub fn action_effect_summary(
        &self,
        sheet: &CharacterSheet,
        kind: ActionKind,
        effects: &[&str],
        magnitude: &str,
    ) -> EffectSummary {
        let lines = effects
            .iter()
            .filter(|name| sheet.is_condition_active(name))
            .map(|name| EffectLine::Condition {
                condition: locale::condition_label(name),
                boons_banes: kind.boons_banes_label(),
                magnitude: magnitude.to_string(),
            })
            .collect();
        EffectSummary {
            header: None,
            lines,
        }
    }

    /// Every active, non-zero modifier of `talent`, in a fixed order.
    pub fn build_talent_effect_summary(
        &self,
        talent: &Talent,
        show_name: bool,
        scope: TalentScope,
    ) -> EffectSummary {
        let mut lines = Vec::new();

        if let Some(action) = &talent.action {
            push_attribute_boons_banes(&mut lines, action);
            if let Some(damage) = action.damage() {
                lines.push(EffectLine::modifier(locale::TALENT_EXTRA_DAMAGE, damage));
            }
            if let Some(plus20) = action.plus20() {
                lines.push(EffectLine::modifier(locale::TALENT_EXTRA_DAMAGE_20_PLUS, plus20));
            }
        }

        if scope == TalentScope::Talent {
            if let Some(challenge) = &talent.challenge {
                push_attribute_boons_banes(&mut lines, challenge);
            }
            if let Some(vs) = &talent.vs {
                if let Some(value) = vs.boons_banes() {
                    lines.push(EffectLine::modifier(locale::TALENT_VS_BOONS_BANES, value));
                }
                if let Some(value) = vs.damage() {
                    lines.push(EffectLine::modifier(locale::TALENT_VS_DAMAGE, value));
                }
            }
            if let Some(rate) = talent.healing.as_ref().and_then(|h| h.rate()) {
                lines.push(EffectLine::modifier(locale::TALENT_HEALING, rate));
            }
            if let Some(damage) = talent.flat_damage() {
                lines.push(EffectLine::modifier(locale::TALENT_DAMAGE, damage));
            }
            if !show_name {
                if let Some(bonuses) = &talent.bonuses {
                    let entries = [
                        (locale::TALENT_BONUS_DEFENSE, bonuses.defense()),
                        (locale::TALENT_BONUS_HEALTH, bonuses.health()),
                        (locale::TALENT_BONUS_SPEED, bonuses.speed()),
                        (locale::TALENT_BONUS_POWER, bonuses.power()),
                    ];
                    for (label, value) in entries {
                        if let Some(value) = value {
                            lines.push(EffectLine::modifier(label, value));
                        }
                    }
                }
            }
        }

        EffectSummary {
            header: (show_name && !lines.is_empty()).then(|| talent.name.clone()),
            lines,
        }
    }
}

fn push_attribute_boons_banes(lines: &mut Vec<EffectLine>, mods: &RollModifiers) {
    let Some(value) = mods.boons_banes() else {
        return;
    };
    for attribute in Attribute::ALL {
        if mods.selects(attribute) {
            lines.push(EffectLine::Modifier {
                label: locale::TALENT_ATTACK_BOONS_BANES,
                attribute: Some(locale::attribute_label(attribute)),
                value: value.to_string(),
            });
        }
    }
}

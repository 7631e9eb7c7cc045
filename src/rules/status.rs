//! Token status effects and the sheet fields they mirror.
//!
//! Toggling a status icon on a token writes the matching condition on the
//! actor sheet; [`token_sync`] goes the other way and lists the icon toggles a
//! freshly placed or updated token needs.

use std::collections::BTreeSet;

use serde_json::Value;

use super::types::CharacterSheet;
use crate::errors::RulesError;
use crate::storage::{Document, Patch};

/// One status icon: its id on the token, the label the host shows, and the
/// `system` fields it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEffect {
    pub id: &'static str,
    pub label: &'static str,
    pub fields: &'static [&'static str],
}

macro_rules! status {
    ($id:literal, $label:literal, [$($field:literal),+]) => {
        StatusEffect { id: $id, label: $label, fields: &[$($field),+] }
    };
}

/// Icon order as registered with the host.
pub const STATUS_EFFECTS: &[StatusEffect] = &[
    status!("injured", "Injured", ["characteristics.health.injured"]),
    status!("asleep", "Asleep", ["afflictions.asleep", "afflictions.prone", "afflictions.unconscious"]),
    status!("blinded", "Blinded", ["afflictions.blinded"]),
    status!("charmed", "Charmed", ["afflictions.charmed"]),
    status!("compelled", "Compelled", ["afflictions.compelled"]),
    status!("dazed", "Dazed", ["afflictions.dazed"]),
    status!("deafened", "Deafened", ["afflictions.deafened"]),
    status!("defenseless", "Defenseless", ["afflictions.defenseless"]),
    status!("diseased", "Diseased", ["afflictions.diseased"]),
    status!("fatigued", "Fatigued", ["afflictions.fatigued"]),
    status!("frightened", "Frightened", ["afflictions.frightened"]),
    status!("horrified", "Horrified", ["afflictions.horrified"]),
    status!("grabbed", "Grabbed", ["afflictions.grabbed"]),
    status!("immobilized", "Immobilized", ["afflictions.immobilized"]),
    status!("impaired", "Impaired", ["afflictions.impaired"]),
    status!("poisoned", "Poisoned", ["afflictions.poisoned"]),
    status!("prone", "Prone", ["afflictions.prone"]),
    status!("slowed", "Slowed", ["afflictions.slowed"]),
    status!("stunned", "Stunned", ["afflictions.stunned"]),
    status!("surprised", "Surprised", ["afflictions.surprised"]),
    status!("unconscious", "Unconscious", ["afflictions.unconscious"]),
    status!("concentrate", "Concentrate", ["actions.concentrate"]),
    status!("defend", "Defend", ["actions.defend"]),
    status!("help", "Help", ["actions.help"]),
    status!("prepare", "Prepare", ["actions.prepare"]),
    status!("reload", "Reload", ["actions.reload"]),
    status!("retreat", "Retreat", ["actions.retreat"]),
    status!("rush", "Rush", ["actions.rush"]),
    status!("stabilize", "Stabilize", ["actions.stabilize"]),
];

/// Looks up a status effect by its display label (exact match, as the host
/// reports it).
pub fn find_status(label: &str) -> Option<&'static StatusEffect> {
    STATUS_EFFECTS.iter().find(|e| e.label == label)
}

/// Field writes for a status icon turned on or off. Unknown labels (icons
/// from other modules) yield `None`.
pub fn apply_status_effect(doc_id: &str, label: &str, active: bool) -> Option<Patch> {
    let effect = find_status(label)?;
    Some(
        effect
            .fields
            .iter()
            .fold(Patch::new(doc_id), |patch, field| {
                patch.set(&format!("system.{}", field), Value::Bool(active))
            }),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusToggle {
    pub id: &'static str,
    pub enable: bool,
}

fn sheet_shows(sheet: &CharacterSheet, effect: &StatusEffect) -> bool {
    match effect.id {
        "injured" => sheet.characteristics.health.injured,
        id => sheet.is_condition_active(id),
    }
}

/// Icon toggles needed so a token showing `shown` mirrors the actor's sheet.
/// Icons not in the status table are left alone.
pub fn token_sync(
    actor: &Document,
    shown: &BTreeSet<String>,
) -> Result<Vec<StatusToggle>, RulesError> {
    let sheet = CharacterSheet::from_document(actor)?;
    Ok(STATUS_EFFECTS
        .iter()
        .filter_map(|effect| {
            let wanted = sheet_shows(&sheet, effect);
            let present = shown.contains(effect.id);
            (wanted != present).then_some(StatusToggle {
                id: effect.id,
                enable: wanted,
            })
        })
        .collect())
}

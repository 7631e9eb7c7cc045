//! # Rules Module - Affliction Gate and Sheet Projections
//!
//! Pure rules evaluation over actor and item documents:
//!
//! - [`gate`] - action blocking and effect summaries
//! - [`status`] - token status icons and the sheet fields they drive
//! - [`combat`] - fixed-phase initiative
//! - [`types`] - typed, read-only views of `system` blocks
//! - [`locale`] - locale keys emitted by the above

pub mod combat;
pub mod gate;
pub mod locale;
pub mod status;
pub mod types;

pub use combat::{actor_initiative, initiative, Side};
pub use gate::{ActionKind, AfflictionGate, EffectLine, EffectSummary, Gate, TalentScope};
pub use locale::{LocaleKey, WarningTable};
pub use status::{apply_status_effect, token_sync, StatusEffect, StatusToggle, STATUS_EFFECTS};
pub use types::{
    ActionState, Affliction, Attribute, CharacterSheet, ConditionKey, ConditionMap, Corruption,
    ModValue, Talent,
};

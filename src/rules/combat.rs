//! Turn order.
//!
//! The system has no initiative roll: characters and creatures each act in a
//! fast or a slow phase, and the phase decides a fixed initiative value.

use super::types::CharacterSheet;
use crate::errors::RulesError;
use crate::storage::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Character,
    Creature,
}

impl Side {
    /// Anything that is not a character takes the creature phases.
    pub fn of(kind: &str) -> Self {
        if kind == "character" {
            Side::Character
        } else {
            Side::Creature
        }
    }
}

/// Fast characters, fast creatures, slow characters, slow creatures.
pub fn initiative(side: Side, fast_turn: bool) -> u32 {
    match (side, fast_turn) {
        (Side::Character, true) => 70,
        (Side::Creature, true) => 50,
        (Side::Character, false) => 30,
        (Side::Creature, false) => 10,
    }
}

pub fn actor_initiative(actor: &Document) -> Result<u32, RulesError> {
    let sheet = CharacterSheet::from_document(actor)?;
    Ok(initiative(Side::of(&actor.kind), sheet.fastturn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_order() {
        let mut order = vec![
            initiative(Side::Creature, false),
            initiative(Side::Character, true),
            initiative(Side::Character, false),
            initiative(Side::Creature, true),
        ];
        order.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(order, vec![70, 50, 30, 10]);
    }

    #[test]
    fn test_actor_initiative() {
        let hero = Document::new("h", "Hero", "character", json!({"fastturn": true}));
        let ghoul = Document::new("g", "Ghoul", "creature", json!({}));
        assert_eq!(actor_initiative(&hero).unwrap(), 70);
        assert_eq!(actor_initiative(&ghoul).unwrap(), 10);
    }
}

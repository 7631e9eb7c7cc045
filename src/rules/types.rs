use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::errors::RulesError;
use crate::storage::Document;

/// Fixed name set for a boolean condition map (afflictions or action states).
pub trait ConditionKey: Copy + Eq + fmt::Debug + 'static {
    const ALL: &'static [Self];

    /// Key used in the document's `system` block.
    fn key(self) -> &'static str;

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Affliction {
    Asleep,
    Blinded,
    Charmed,
    Compelled,
    Dazed,
    Deafened,
    Defenseless,
    Diseased,
    Fatigued,
    Frightened,
    Horrified,
    Grabbed,
    Immobilized,
    Impaired,
    Poisoned,
    Prone,
    Slowed,
    Stunned,
    Surprised,
    Unconscious,
}

impl ConditionKey for Affliction {
    const ALL: &'static [Self] = &[
        Affliction::Asleep,
        Affliction::Blinded,
        Affliction::Charmed,
        Affliction::Compelled,
        Affliction::Dazed,
        Affliction::Deafened,
        Affliction::Defenseless,
        Affliction::Diseased,
        Affliction::Fatigued,
        Affliction::Frightened,
        Affliction::Horrified,
        Affliction::Grabbed,
        Affliction::Immobilized,
        Affliction::Impaired,
        Affliction::Poisoned,
        Affliction::Prone,
        Affliction::Slowed,
        Affliction::Stunned,
        Affliction::Surprised,
        Affliction::Unconscious,
    ];

    fn key(self) -> &'static str {
        match self {
            Affliction::Asleep => "asleep",
            Affliction::Blinded => "blinded",
            Affliction::Charmed => "charmed",
            Affliction::Compelled => "compelled",
            Affliction::Dazed => "dazed",
            Affliction::Deafened => "deafened",
            Affliction::Defenseless => "defenseless",
            Affliction::Diseased => "diseased",
            Affliction::Fatigued => "fatigued",
            Affliction::Frightened => "frightened",
            Affliction::Horrified => "horrified",
            Affliction::Grabbed => "grabbed",
            Affliction::Immobilized => "immobilized",
            Affliction::Impaired => "impaired",
            Affliction::Poisoned => "poisoned",
            Affliction::Prone => "prone",
            Affliction::Slowed => "slowed",
            Affliction::Stunned => "stunned",
            Affliction::Surprised => "surprised",
            Affliction::Unconscious => "unconscious",
        }
    }
}

impl std::str::FromStr for Affliction {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| RulesError::NotFound(format!("affliction '{}'", s)))
    }
}

/// Combat action a character has declared for the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionState {
    Concentrate,
    Defend,
    Help,
    Prepare,
    Reload,
    Retreat,
    Rush,
    Stabilize,
}

impl ConditionKey for ActionState {
    const ALL: &'static [Self] = &[
        ActionState::Concentrate,
        ActionState::Defend,
        ActionState::Help,
        ActionState::Prepare,
        ActionState::Reload,
        ActionState::Retreat,
        ActionState::Rush,
        ActionState::Stabilize,
    ];

    fn key(self) -> &'static str {
        match self {
            ActionState::Concentrate => "concentrate",
            ActionState::Defend => "defend",
            ActionState::Help => "help",
            ActionState::Prepare => "prepare",
            ActionState::Reload => "reload",
            ActionState::Retreat => "retreat",
            ActionState::Rush => "rush",
            ActionState::Stabilize => "stabilize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Strength,
    Agility,
    Intellect,
    Will,
    Perception,
}

impl Attribute {
    /// Iteration order for every per-attribute summary line.
    pub const ALL: [Attribute; 5] = [
        Attribute::Strength,
        Attribute::Agility,
        Attribute::Intellect,
        Attribute::Will,
        Attribute::Perception,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Attribute::Strength => "strength",
            Attribute::Agility => "agility",
            Attribute::Intellect => "intellect",
            Attribute::Will => "will",
            Attribute::Perception => "perception",
        }
    }
}

/// Reads any JSON value as a boolean flag; `null`, `0`, `""` and absent are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}

/// Reads a sub-block, falling back to its default when it is `null` or has
/// the wrong shape. Sheets are projections: an off-shape block the rules do
/// not understand reads as "nothing active".
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        debug!("ignoring off-shape sheet block: {}", e);
        T::default()
    }))
}

/// Finite number, or a string holding one; anything else reads as zero.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()).unwrap_or(0.0))
}

/// Boolean condition map keyed by name.
///
/// Every stored key survives a round trip, including keys the crate does not
/// know about; lookups only go through the typed key set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct ConditionMap<C: ConditionKey> {
    entries: BTreeMap<String, Value>,
    #[serde(skip)]
    _kind: PhantomData<C>,
}

impl<C: ConditionKey> Default for ConditionMap<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            _kind: PhantomData,
        }
    }
}

impl<C: ConditionKey> ConditionMap<C> {
    pub fn is_active(&self, condition: C) -> bool {
        self.entries
            .get(condition.key())
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// Name lookup for untyped callers; unknown names read as inactive.
    pub fn is_active_key(&self, key: &str) -> bool {
        C::from_key(key).map(|c| self.is_active(c)).unwrap_or(false)
    }

    pub fn set(&mut self, condition: C, active: bool) {
        self.entries
            .insert(condition.key().to_string(), Value::Bool(active));
    }

    pub fn active(&self) -> impl Iterator<Item = C> + '_ {
        C::ALL.iter().copied().filter(move |c| self.is_active(*c))
    }
}

/// Corruption as stored on an actor: either the legacy bare number or the
/// tracked `{ value, immune }` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Corruption {
    Tracked {
        #[serde(default, deserialize_with = "lenient_number")]
        value: f64,
        #[serde(default, deserialize_with = "truthy")]
        immune: bool,
    },
    Legacy(f64),
    LegacyText(String),
}

impl Corruption {
    pub fn value(&self) -> f64 {
        match self {
            Corruption::Tracked { value, .. } | Corruption::Legacy(value) => *value,
            Corruption::LegacyText(text) => text.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn immune(&self) -> bool {
        matches!(self, Corruption::Tracked { immune: true, .. })
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, Corruption::Tracked { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Health {
    #[serde(default, deserialize_with = "truthy")]
    pub injured: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Characteristics {
    #[serde(default, deserialize_with = "lenient")]
    pub health: Health,
    #[serde(default, deserialize_with = "lenient")]
    pub corruption: Option<Corruption>,
}

/// Read-only projection of an actor's `system` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterSheet {
    #[serde(default, deserialize_with = "lenient")]
    pub afflictions: ConditionMap<Affliction>,
    #[serde(default, deserialize_with = "lenient")]
    pub actions: ConditionMap<ActionState>,
    #[serde(default, deserialize_with = "lenient")]
    pub characteristics: Characteristics,
    #[serde(default, deserialize_with = "truthy")]
    pub fastturn: bool,
}

impl CharacterSheet {
    /// Projects an actor's `system` block. Blocks of the wrong shape read as
    /// empty; only a `system` that is not an object at all is refused.
    pub fn from_document(doc: &Document) -> Result<Self, RulesError> {
        match &doc.system {
            Value::Null => Ok(Self::default()),
            system @ Value::Object(_) => Ok(serde_json::from_value(system.clone())?),
            _ => Err(RulesError::UnexpectedShape {
                path: format!("{}.system", doc.id),
                expected: "an object",
            }),
        }
    }

    /// True when `name` is an active affliction or an active action state.
    pub fn is_condition_active(&self, name: &str) -> bool {
        self.afflictions.is_active_key(name) || self.actions.is_active_key(name)
    }
}

/// Modifier amount as entered on an item sheet: a number or free text such
/// as `+1` or `1d6`. Anything else is kept but never counts as set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModValue {
    Number(f64),
    Text(String),
    Other(Value),
}

impl ModValue {
    /// Zero, blank and `"0"` all count as "not configured".
    pub fn is_set(&self) -> bool {
        match self {
            ModValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ModValue::Text(s) => {
                let s = s.trim();
                !s.is_empty() && s.parse::<f64>().map(|n| n != 0.0).unwrap_or(true)
            }
            ModValue::Other(_) => false,
        }
    }
}

impl fmt::Display for ModValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModValue::Number(n) => write!(f, "{}", n),
            ModValue::Text(s) => write!(f, "{}", s.trim()),
            ModValue::Other(v) => write!(f, "{}", v),
        }
    }
}

/// The value of a toggle/value pair, only when the toggle is on and the value set.
fn gated(active: bool, value: &Option<ModValue>) -> Option<&ModValue> {
    value.as_ref().filter(|v| active && v.is_set())
}

/// Attack (`action`) or challenge (`challenge`) roll modifiers of a talent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollModifiers {
    #[serde(rename = "boonsbanesactive", default, deserialize_with = "truthy")]
    pub boons_banes_active: bool,
    #[serde(rename = "boonsbanes", default)]
    pub boons_banes: Option<ModValue>,
    #[serde(rename = "strengthboonsbanesselect", default, deserialize_with = "truthy")]
    pub strength_selected: bool,
    #[serde(rename = "agilityboonsbanesselect", default, deserialize_with = "truthy")]
    pub agility_selected: bool,
    #[serde(rename = "intellectboonsbanesselect", default, deserialize_with = "truthy")]
    pub intellect_selected: bool,
    #[serde(rename = "willboonsbanesselect", default, deserialize_with = "truthy")]
    pub will_selected: bool,
    #[serde(rename = "perceptionboonsbanesselect", default, deserialize_with = "truthy")]
    pub perception_selected: bool,
    #[serde(rename = "damageactive", default, deserialize_with = "truthy")]
    pub damage_active: bool,
    #[serde(default)]
    pub damage: Option<ModValue>,
    #[serde(rename = "plus20active", default, deserialize_with = "truthy")]
    pub plus20_active: bool,
    #[serde(default)]
    pub plus20: Option<ModValue>,
}

impl RollModifiers {
    pub fn boons_banes(&self) -> Option<&ModValue> {
        gated(self.boons_banes_active, &self.boons_banes)
    }

    pub fn selects(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Strength => self.strength_selected,
            Attribute::Agility => self.agility_selected,
            Attribute::Intellect => self.intellect_selected,
            Attribute::Will => self.will_selected,
            Attribute::Perception => self.perception_selected,
        }
    }

    pub fn damage(&self) -> Option<&ModValue> {
        gated(self.damage_active, &self.damage)
    }

    pub fn plus20(&self) -> Option<&ModValue> {
        gated(self.plus20_active, &self.plus20)
    }
}

/// Modifiers applied to opposed ("vs") rolls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpposedModifiers {
    #[serde(rename = "boonsbanesactive", default, deserialize_with = "truthy")]
    pub boons_banes_active: bool,
    #[serde(rename = "boonsbanes", default)]
    pub boons_banes: Option<ModValue>,
    #[serde(rename = "damageactive", default, deserialize_with = "truthy")]
    pub damage_active: bool,
    #[serde(default)]
    pub damage: Option<ModValue>,
}

impl OpposedModifiers {
    pub fn boons_banes(&self) -> Option<&ModValue> {
        gated(self.boons_banes_active, &self.boons_banes)
    }

    pub fn damage(&self) -> Option<&ModValue> {
        gated(self.damage_active, &self.damage)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Healing {
    #[serde(rename = "healactive", default, deserialize_with = "truthy")]
    pub active: bool,
    #[serde(default)]
    pub rate: Option<ModValue>,
}

impl Healing {
    pub fn rate(&self) -> Option<&ModValue> {
        gated(self.active, &self.rate)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bonuses {
    #[serde(rename = "defenseactive", default, deserialize_with = "truthy")]
    pub defense_active: bool,
    #[serde(default)]
    pub defense: Option<ModValue>,
    #[serde(rename = "healthactive", default, deserialize_with = "truthy")]
    pub health_active: bool,
    #[serde(default)]
    pub health: Option<ModValue>,
    #[serde(rename = "speedactive", default, deserialize_with = "truthy")]
    pub speed_active: bool,
    #[serde(default)]
    pub speed: Option<ModValue>,
    #[serde(rename = "poweractive", default, deserialize_with = "truthy")]
    pub power_active: bool,
    #[serde(default)]
    pub power: Option<ModValue>,
}

impl Bonuses {
    pub fn defense(&self) -> Option<&ModValue> {
        gated(self.defense_active, &self.defense)
    }

    pub fn health(&self) -> Option<&ModValue> {
        gated(self.health_active, &self.health)
    }

    pub fn speed(&self) -> Option<&ModValue> {
        gated(self.speed_active, &self.speed)
    }

    pub fn power(&self) -> Option<&ModValue> {
        gated(self.power_active, &self.power)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub attribute: String,
    pub minvalue: Value,
}

/// Read-only projection of a talent (or any modifier-bearing item).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Talent {
    #[serde(skip)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub action: Option<RollModifiers>,
    #[serde(default, deserialize_with = "lenient")]
    pub challenge: Option<RollModifiers>,
    #[serde(default, deserialize_with = "lenient")]
    pub vs: Option<OpposedModifiers>,
    #[serde(default, deserialize_with = "lenient")]
    pub healing: Option<Healing>,
    #[serde(default)]
    pub damage: Option<ModValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub bonuses: Option<Bonuses>,
    /// Structured requirement; legacy free-text requirements read as `None`.
    #[serde(default, deserialize_with = "lenient")]
    pub requirement: Option<Requirement>,
}

impl Talent {
    pub fn from_document(doc: &Document) -> Result<Self, RulesError> {
        let mut talent: Talent = match &doc.system {
            Value::Null => Talent::default(),
            system @ Value::Object(_) => serde_json::from_value(system.clone())?,
            _ => {
                return Err(RulesError::UnexpectedShape {
                    path: format!("{}.system", doc.id),
                    expected: "an object",
                })
            }
        };
        talent.name = doc.name.clone();
        Ok(talent)
    }

    /// Flat damage, set when non-zero; it has no toggle of its own.
    pub fn flat_damage(&self) -> Option<&ModValue> {
        self.damage.as_ref().filter(|v| v.is_set())
    }
}

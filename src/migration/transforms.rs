//! Per-document transforms used by the migration steps.
//!
//! Every function here is pure: it looks at one document and returns the patch
//! that brings it to the newer shape, or `None` when the document is already
//! there. Returning `None` on a second pass is what keeps a step idempotent.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::RulesError;
use crate::rules::types::{is_truthy, ActionState, Affliction, ConditionKey};
use crate::storage::{Document, Patch};

const LEGACY_ICON_ROOT: &str = "systems/demonlord/icons";

/// Depth down to which stored `null`s count as missing during backfill.
const NULL_AS_MISSING_DEPTH: usize = 5;

/// `strengthmin: N` becomes `requirement { attribute: "Strength", minvalue: N }`.
/// The legacy key is removed so the record is not picked up again. A
/// `strengthmin` holding an object or list is an error.
pub fn strength_requirement(item: &Document) -> Result<Option<Patch>, RulesError> {
    let Some(strengthmin) = item.system_field("strengthmin") else {
        return Ok(None);
    };
    if strengthmin.is_object() || strengthmin.is_array() {
        return Err(RulesError::UnexpectedShape {
            path: format!("{}.system.strengthmin", item.id),
            expected: "a number or text",
        });
    }
    if !is_truthy(strengthmin) {
        return Ok(None);
    }
    Ok(Some(
        Patch::new(&item.id)
            .set("system.requirement.attribute", json!("Strength"))
            .set("system.requirement.minvalue", strengthmin.clone())
            .unset("system.strengthmin"),
    ))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// A bare numeric corruption score becomes `{ value, immune: false }`.
/// Absent, `null`, blank or already tracked corruption is left alone; any
/// other value cannot be read as a score and is an error.
pub fn corruption_tracking(actor: &Document) -> Result<Option<Patch>, RulesError> {
    let Some(current) = actor.system_field("characteristics.corruption") else {
        return Ok(None);
    };
    let value = match current {
        Value::Null | Value::Object(_) => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        other => numeric(other).ok_or_else(|| RulesError::UnexpectedShape {
            path: format!("{}.system.characteristics.corruption", actor.id),
            expected: "a numeric corruption score",
        })?,
    };
    let value = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    };
    Ok(Some(Patch::new(&actor.id).set(
        "system.characteristics.corruption",
        json!({ "value": value, "immune": false }),
    )))
}

/// Rewrites an image under the pre-2.0 icon root to the new asset tree.
pub fn migrate_icon_path(img: &str) -> Option<String> {
    if !img.contains(LEGACY_ICON_ROOT) {
        return None;
    }
    Some(
        img.replacen("/demonlord/icons", "/demonlord/assets/icons", 1)
            .replacen(".png", ".webp", 1),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathIcons {
    pub novice: String,
    #[serde(default)]
    pub expert: Option<String>,
    #[serde(default)]
    pub master: Option<String>,
}

/// Replacement icons for items still showing the host's placeholder image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultIcons {
    pub placeholder: String,
    /// Item type -> icon. Paths are looked up in `path` instead.
    #[serde(default)]
    pub items: HashMap<String, String>,
    pub path: PathIcons,
}

impl DefaultIcons {
    pub fn for_item(&self, item: &Document) -> Option<String> {
        if item.kind == "path" {
            let tier = item
                .system_field("type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let icon = match tier {
                "expert" => self.path.expert.as_ref(),
                "master" => self.path.master.as_ref(),
                _ => None,
            };
            return Some(icon.unwrap_or(&self.path.novice).clone());
        }
        self.items.get(&item.kind).cloned()
    }
}

impl Default for DefaultIcons {
    fn default() -> Self {
        let root = "systems/demonlord/assets/icons";
        let items = [
            "ammo",
            "ancestry",
            "armor",
            "creaturerole",
            "endoftheround",
            "feature",
            "item",
            "language",
            "profession",
            "relic",
            "specialaction",
            "spell",
            "talent",
            "weapon",
        ]
        .iter()
        .map(|kind| (kind.to_string(), format!("{}/{}/{}.webp", root, kind, kind)))
        .collect();
        Self {
            placeholder: "icons/svg/mystery-man.svg".to_string(),
            items,
            path: PathIcons {
                novice: format!("{}/path/novice.webp", root),
                expert: Some(format!("{}/path/expert.webp", root)),
                master: Some(format!("{}/path/master.webp", root)),
            },
        }
    }
}

/// Image rewrite for an item: legacy icon root first, then (when enabled)
/// the placeholder backfill.
pub fn item_icon_patch(item: &Document, defaults: Option<&DefaultIcons>) -> Option<Patch> {
    let img = item.img.as_deref()?;
    let new_img = migrate_icon_path(img).or_else(|| {
        defaults
            .filter(|d| img == d.placeholder)
            .and_then(|d| d.for_item(item))
    })?;
    (new_img != img).then(|| Patch::new(&item.id).set("img", json!(new_img)))
}

/// Actor portrait and religion symbol under the legacy icon root.
pub fn actor_icon_patch(actor: &Document) -> Option<Patch> {
    let mut patch = Patch::new(&actor.id);
    if let Some(img) = actor.img.as_deref().and_then(migrate_icon_path) {
        patch = patch.set("img", json!(img));
    }
    if let Some(image) = actor
        .system_field("religion.image")
        .and_then(Value::as_str)
        .and_then(migrate_icon_path)
    {
        patch = patch.set("system.religion.image", json!(image));
    }
    (!patch.is_empty()).then_some(patch)
}

const CHARACTER_RESET: &[(&str, i64)] = &[
    ("attributes.strength.value", 10),
    ("attributes.agility.value", 10),
    ("attributes.intellect.value", 10),
    ("attributes.will.value", 10),
    ("attributes.perception.value", 10),
    ("characteristics.health.max", 0),
    ("characteristics.health.healingrate", 0),
    ("characteristics.defense", 0),
    ("characteristics.speed", 10),
    ("characteristics.power", 0),
    ("characteristics.insanity.max", 0),
];

/// Resets a character's derived numbers to the 2.0 baseline, which the
/// sheet then recomputes from ancestry and paths. Only differing fields are
/// written; creatures are untouched.
pub fn character_reset_patch(actor: &Document) -> Option<Patch> {
    if actor.kind != "character" {
        return None;
    }
    let patch = CHARACTER_RESET
        .iter()
        .filter(|(path, target)| {
            actor
                .system_field(path)
                .and_then(Value::as_f64)
                .map(|v| v != *target as f64)
                .unwrap_or(true)
        })
        .fold(Patch::new(&actor.id), |patch, (path, target)| {
            patch.set(&format!("system.{}", path), json!(target))
        });
    (!patch.is_empty()).then_some(patch)
}

/// Default `system` blocks per actor type.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorTemplates {
    templates: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct TemplateFile {
    #[serde(rename = "Actor")]
    actor: Map<String, Value>,
}

impl ActorTemplates {
    pub fn new(templates: HashMap<String, Value>) -> Self {
        Self { templates }
    }

    /// Loads the `Actor` section of a system `template.json`. Its `types` and
    /// `templates` entries are bookkeeping and skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RulesError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let file: TemplateFile = serde_json::from_str(&contents)?;
        let templates = file
            .actor
            .into_iter()
            .filter(|(kind, _)| kind != "types" && kind != "templates")
            .collect();
        Ok(Self { templates })
    }

    pub fn get(&self, kind: &str) -> Option<&Value> {
        self.templates.get(kind)
    }
}

fn cleared(keys: impl Iterator<Item = &'static str>) -> Value {
    Value::Object(keys.map(|k| (k.to_string(), Value::Bool(false))).collect())
}

impl Default for ActorTemplates {
    fn default() -> Self {
        let attribute = json!({ "value": 10, "modifier": 0 });
        let afflictions = cleared(Affliction::ALL.iter().map(|a| a.key()));
        let actions = cleared(ActionState::ALL.iter().map(|a| a.key()));
        let shared = json!({
            "attributes": {
                "strength": attribute,
                "agility": attribute,
                "intellect": attribute,
                "will": attribute,
                "perception": attribute,
            },
            "characteristics": {
                "health": { "max": 0, "value": 0, "injured": false, "healingrate": 0 },
                "defense": 0,
                "speed": 10,
                "power": 0,
                "insanity": { "max": 0, "value": 0 },
                "corruption": { "value": 0, "immune": false },
            },
            "afflictions": afflictions,
            "actions": actions,
            "fastturn": false,
        });
        let mut character = shared.clone();
        if let Some(map) = character.as_object_mut() {
            map.insert("religion".to_string(), json!({ "value": "", "image": "" }));
        }
        let mut templates = HashMap::new();
        templates.insert("character".to_string(), character);
        templates.insert("creature".to_string(), shared);
        Self { templates }
    }
}

fn backfill(
    current: &Value,
    template: &Map<String, Value>,
    prefix: &str,
    null_depth: usize,
    patch: Patch,
) -> Patch {
    template.iter().fold(patch, |patch, (key, default)| {
        let path = format!("{}.{}", prefix, key);
        match current.get(key) {
            None => patch.set(&path, default.clone()),
            Some(Value::Null) if null_depth > 0 => patch.set(&path, default.clone()),
            Some(existing @ Value::Object(_)) => match default {
                Value::Object(inner) => {
                    backfill(existing, inner, &path, null_depth.saturating_sub(1), patch)
                }
                _ => patch,
            },
            Some(_) => patch,
        }
    })
}

/// Inserts keys the actor type's template has and the actor lacks. Existing
/// values are never overwritten; `null` counts as missing near the top.
pub fn template_backfill_patch(actor: &Document, templates: &ActorTemplates) -> Option<Patch> {
    let Some(Value::Object(template)) = templates.get(&actor.kind) else {
        return None;
    };
    let current = match &actor.system {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    let patch = backfill(
        &current,
        template,
        "system",
        NULL_AS_MISSING_DEPTH + 1,
        Patch::new(&actor.id),
    );
    (!patch.is_empty()).then_some(patch)
}

//! Host documents and the field patches written back to them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RulesError;

/// An actor or item as the host stores it. `system` stays raw JSON so keys
/// this crate does not model are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub system: Value,
    /// Embedded items, only present on actors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Document>,
}

impl Document {
    pub fn new(id: &str, name: &str, kind: &str, system: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            img: None,
            system,
            items: Vec::new(),
        }
    }

    pub fn with_img(mut self, img: &str) -> Self {
        self.img = Some(img.to_string());
        self
    }

    pub fn with_item(mut self, item: Document) -> Self {
        self.items.push(item);
        self
    }

    /// Value at a dotted path below `system`, e.g. `characteristics.corruption`.
    pub fn system_field(&self, path: &str) -> Option<&Value> {
        lookup(&self.system, path)
    }

    /// Applies `patch` in place. Embedded items are never reached through a
    /// patch on their owner.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), RulesError> {
        for change in &patch.changes {
            match change {
                FieldChange::Set { path, value } => self.set_field(path, value.clone())?,
                FieldChange::Unset { path } => self.unset_field(path)?,
            }
        }
        Ok(())
    }

    fn set_field(&mut self, path: &str, value: Value) -> Result<(), RulesError> {
        match path {
            "name" => {
                self.name = value.as_str().unwrap_or_default().to_string();
                Ok(())
            }
            "img" => {
                self.img = value.as_str().map(str::to_string);
                Ok(())
            }
            _ => match path.strip_prefix("system.") {
                Some(rest) => set_path(&mut self.system, path, rest, value),
                None => Err(RulesError::InvalidPath {
                    path: path.to_string(),
                    reason: "only name, img and system.* are writable".to_string(),
                }),
            },
        }
    }

    fn unset_field(&mut self, path: &str) -> Result<(), RulesError> {
        let rest = path.strip_prefix("system.").ok_or_else(|| RulesError::InvalidPath {
            path: path.to_string(),
            reason: "only system.* fields can be removed".to_string(),
        })?;
        let (parent, leaf) = match rest.rsplit_once('.') {
            Some((parent, leaf)) => (lookup_mut(&mut self.system, parent), leaf),
            None => (Some(&mut self.system), rest),
        };
        if let Some(Value::Object(map)) = parent {
            map.remove(leaf);
        }
        Ok(())
    }
}

pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.get(key))
}

fn lookup_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(root, |node, key| node.get_mut(key))
}

fn set_path(root: &mut Value, full: &str, rest: &str, value: Value) -> Result<(), RulesError> {
    if root.is_null() {
        *root = Value::Object(Map::new());
    }
    let mut node = root;
    let mut keys = rest.split('.').peekable();
    while let Some(key) = keys.next() {
        let map = node.as_object_mut().ok_or_else(|| RulesError::InvalidPath {
            path: full.to_string(),
            reason: format!("'{}' is not an object", key),
        })?;
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        let child = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if child.is_null() {
            *child = Value::Object(Map::new());
        }
        node = child;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldChange {
    Set { path: String, value: Value },
    Unset { path: String },
}

/// `{ id, fields }` update for one document, applied as part of a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub changes: Vec<FieldChange>,
}

impl Patch {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            changes: Vec::new(),
        }
    }

    pub fn set(mut self, path: &str, value: Value) -> Self {
        self.changes.push(FieldChange::Set {
            path: path.to_string(),
            value,
        });
        self
    }

    pub fn unset(mut self, path: &str) -> Self {
        self.changes.push(FieldChange::Unset {
            path: path.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Appends the changes of `other` (same document).
    pub fn merge(mut self, other: Patch) -> Self {
        debug_assert_eq!(self.id, other.id);
        self.changes.extend(other.changes);
        self
    }

    pub fn touches(&self, path: &str) -> bool {
        self.changes.iter().any(|c| match c {
            FieldChange::Set { path: p, .. } | FieldChange::Unset { path: p } => p == path,
        })
    }
}

/// Folds optional patches for one document into a single non-empty patch.
pub fn combine(patches: impl IntoIterator<Item = Option<Patch>>) -> Option<Patch> {
    patches
        .into_iter()
        .flatten()
        .reduce(|acc, next| acc.merge(next))
        .filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = Document::new("a1", "Sword", "weapon", json!({"strengthmin": 11}));
        doc.apply(
            &Patch::new("a1")
                .set("system.requirement.attribute", json!("Strength"))
                .set("system.requirement.minvalue", json!(11))
                .unset("system.strengthmin"),
        )
        .unwrap();
        assert_eq!(
            doc.system,
            json!({"requirement": {"attribute": "Strength", "minvalue": 11}})
        );
    }

    #[test]
    fn test_set_replaces_scalar_leaf() {
        let mut doc = Document::new("c1", "Hero", "character", json!({"characteristics": {"corruption": 2}}));
        doc.apply(&Patch::new("c1").set(
            "system.characteristics.corruption",
            json!({"value": 2, "immune": false}),
        ))
        .unwrap();
        assert_eq!(
            doc.system_field("characteristics.corruption.value"),
            Some(&json!(2))
        );
    }

    #[test]
    fn test_set_through_scalar_is_rejected() {
        let mut doc = Document::new("c1", "Hero", "character", json!({"religion": "none"}));
        let err = doc
            .apply(&Patch::new("c1").set("system.religion.image", json!("x.webp")))
            .unwrap_err();
        assert!(matches!(err, RulesError::InvalidPath { .. }));
    }

    #[test]
    fn test_top_level_fields() {
        let mut doc = Document::new("i1", "Axe", "weapon", json!({}));
        doc.apply(&Patch::new("i1").set("img", json!("systems/demonlord/assets/icons/axe.webp")))
            .unwrap();
        assert_eq!(doc.img.as_deref(), Some("systems/demonlord/assets/icons/axe.webp"));
        assert!(doc.apply(&Patch::new("i1").set("items", json!([]))).is_err());
    }

    #[test]
    fn test_combine_skips_empty() {
        assert!(combine(vec![None, Some(Patch::new("x"))]).is_none());
        let merged = combine(vec![
            Some(Patch::new("x").set("img", json!("a"))),
            None,
            Some(Patch::new("x").set("name", json!("b"))),
        ])
        .unwrap();
        assert_eq!(merged.changes.len(), 2);
        assert!(merged.touches("name"));
    }

    #[test]
    fn test_id_alias() {
        let doc: Document = serde_json::from_value(json!({"id": "z", "type": "talent"})).unwrap();
        assert_eq!(doc.id, "z");
        assert_eq!(serde_json::to_value(&doc).unwrap()["_id"], json!("z"));
    }
}

//! Test utilities & fixtures.
//! Builds throwaway sled worlds and recording host collaborators.

use std::cell::{Cell, RefCell};

use serde_json::json;
use tempfile::TempDir;

use demonlord::host::{Notifier, Prompt};
use demonlord::storage::{Document, PackInfo, PackKind, SledWorldStore};

#[allow(dead_code)] // not every test binary inspects banners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Info,
    Warn,
    Error,
}

/// Keeps every banner so tests can assert on order and severity.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub banners: RefCell<Vec<(Banner, String, bool)>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn count(&self, level: Banner) -> usize {
        self.banners.borrow().iter().filter(|(l, _, _)| *l == level).count()
    }

    pub fn messages(&self) -> Vec<String> {
        self.banners.borrow().iter().map(|(_, m, _)| m.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, message: &str, permanent: bool) {
        self.banners.borrow_mut().push((Banner::Info, message.to_string(), permanent));
    }

    fn warn(&self, message: &str, permanent: bool) {
        self.banners.borrow_mut().push((Banner::Warn, message.to_string(), permanent));
    }

    fn error(&self, message: &str, permanent: bool) {
        self.banners.borrow_mut().push((Banner::Error, message.to_string(), permanent));
    }
}

/// Fixed answer that counts how often it was asked.
#[allow(dead_code)]
pub struct CountingPrompt {
    pub answer: bool,
    pub asked: Cell<usize>,
}

#[allow(dead_code)]
impl CountingPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Cell::new(0),
        }
    }
}

impl Prompt for CountingPrompt {
    fn confirm(&self, _title: &str, _question: &str, _default_yes: bool) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

pub fn empty_world() -> (TempDir, SledWorldStore) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = SledWorldStore::open(tmp.path().join("world")).expect("open store");
    (tmp, store)
}

#[allow(dead_code)]
pub const PLACEHOLDER: &str = "icons/svg/mystery-man.svg";

/// A world last migrated by an old system release: legacy icons, bare
/// corruption numbers, `strengthmin` everywhere.
#[allow(dead_code)]
pub fn legacy_world(version: &str) -> (TempDir, SledWorldStore) {
    let (tmp, store) = empty_world();

    store
        .put_item(
            &Document::new("club", "Club", "weapon", json!({"strengthmin": 10}))
                .with_img("systems/demonlord/icons/weapons/club.png"),
        )
        .unwrap();
    store
        .put_item(&Document::new("fireball", "Fireball", "spell", json!({})).with_img(PLACEHOLDER))
        .unwrap();
    store
        .put_item(&Document::new("rope", "Rope", "item", json!({"strengthmin": 0})))
        .unwrap();

    let hero = Document::new(
        "hero",
        "Hero",
        "character",
        json!({
            "attributes": {"strength": {"value": 14}},
            "characteristics": {"corruption": 3, "speed": 12},
            "religion": {"image": "systems/demonlord/icons/religion/sun.png"}
        }),
    )
    .with_img("systems/demonlord/icons/portraits/hero.png")
    .with_item(Document::new("axe", "Axe", "weapon", json!({"strengthmin": 12})).with_img(PLACEHOLDER));
    store.put_actor(&hero).unwrap();

    store
        .put_actor(&Document::new(
            "ghoul",
            "Ghoul",
            "creature",
            json!({"characteristics": {"corruption": "1"}}),
        ))
        .unwrap();

    store
        .put_pack(&PackInfo {
            id: "core-items".to_string(),
            label: "Core Items".to_string(),
            kind: PackKind::Item,
            locked: false,
        })
        .unwrap();
    store
        .put_pack_document(
            "core-items",
            &Document::new("halberd", "Halberd", "weapon", json!({"strengthmin": 13})),
        )
        .unwrap();

    store
        .put_pack(&PackInfo {
            id: "sealed-items".to_string(),
            label: "Sealed Items".to_string(),
            kind: PackKind::Item,
            locked: true,
        })
        .unwrap();
    store
        .put_pack_document(
            "sealed-items",
            &Document::new("maul", "Maul", "weapon", json!({"strengthmin": 15})),
        )
        .unwrap();

    store
        .put_pack(&PackInfo {
            id: "bestiary".to_string(),
            label: "Bestiary".to_string(),
            kind: PackKind::Actor,
            locked: false,
        })
        .unwrap();
    store
        .put_pack_document(
            "bestiary",
            &Document::new("troll", "Troll", "creature", json!({"characteristics": {"corruption": 2}}))
                .with_item(Document::new("claws", "Claws", "weapon", json!({"strengthmin": 11}))),
        )
        .unwrap();

    use demonlord::storage::WorldStore;
    store.set_schema_version(version).unwrap();
    (tmp, store)
}

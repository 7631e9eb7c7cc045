//! # Storage Module - World Document Persistence
//!
//! The rules core only ever sees the host's documents through [`WorldStore`]:
//! read one population, bulk-update one population, and read or stamp the
//! schema version tag. [`SledWorldStore`] is the sled-backed implementation
//! used by the CLI and the integration tests.
//!
//! ## Layout
//!
//! ```text
//! items        <id>                 -> world item document (JSON)
//! actors       <id>                 -> world actor document, embedded items inline
//! packs        <pack>               -> PackInfo
//! pack_docs    <pack>:<id>          -> compendium document
//! settings     systemMigrationVersion -> version tag
//! ```
//!
//! ## Write semantics
//!
//! A bulk update applies every patch independently: one bad patch is reported
//! back in [`BulkWrite::rejected`] and does not undo or block the others.

pub mod backup;
pub mod document;

use std::fmt;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::RulesError;

pub use document::{combine, Document, FieldChange, Patch};

const TREE_ITEMS: &str = "items";
const TREE_ACTORS: &str = "actors";
const TREE_PACKS: &str = "packs";
const TREE_PACK_DOCS: &str = "pack_docs";
const TREE_SETTINGS: &str = "settings";

/// Settings key holding the schema version the world was last migrated to.
pub const SCHEMA_VERSION_KEY: &str = "systemMigrationVersion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackKind {
    Item,
    Actor,
}

/// A compendium (library) pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackInfo {
    pub id: String,
    pub label: String,
    pub kind: PackKind,
    #[serde(default)]
    pub locked: bool,
}

/// One independently migrated set of documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Population {
    WorldItems,
    WorldActors,
    EmbeddedItems { actor_id: String },
    PackItems { pack: String },
    PackActors { pack: String },
    PackEmbeddedItems { pack: String, actor_id: String },
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Population::WorldItems => write!(f, "world items"),
            Population::WorldActors => write!(f, "world actors"),
            Population::EmbeddedItems { actor_id } => write!(f, "items of actor {}", actor_id),
            Population::PackItems { pack } => write!(f, "items in pack {}", pack),
            Population::PackActors { pack } => write!(f, "actors in pack {}", pack),
            Population::PackEmbeddedItems { pack, actor_id } => {
                write!(f, "items of actor {} in pack {}", actor_id, pack)
            }
        }
    }
}

/// Result of a bulk update: patches that landed and patches refused by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWrite {
    pub applied: usize,
    pub rejected: Vec<(String, String)>,
}

impl BulkWrite {
    pub fn reject(&mut self, id: &str, reason: impl fmt::Display) {
        self.rejected.push((id.to_string(), reason.to_string()));
    }
}

/// Persistence collaborator for the migration pipeline.
pub trait WorldStore {
    fn packs(&self) -> Result<Vec<PackInfo>, RulesError>;

    fn documents(&self, population: &Population) -> Result<Vec<Document>, RulesError>;

    fn bulk_update(
        &self,
        population: &Population,
        patches: &[Patch],
    ) -> Result<BulkWrite, RulesError>;

    fn schema_version(&self) -> Result<Option<String>, RulesError>;

    fn set_schema_version(&self, version: &str) -> Result<(), RulesError>;
}

/// Sled-backed world store.
pub struct SledWorldStore {
    db: sled::Db,
    items: sled::Tree,
    actors: sled::Tree,
    packs: sled::Tree,
    pack_docs: sled::Tree,
    settings: sled::Tree,
}

impl SledWorldStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RulesError> {
        let path_ref = path.as_ref();
        fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Ok(Self {
            items: db.open_tree(TREE_ITEMS)?,
            actors: db.open_tree(TREE_ACTORS)?,
            packs: db.open_tree(TREE_PACKS)?,
            pack_docs: db.open_tree(TREE_PACK_DOCS)?,
            settings: db.open_tree(TREE_SETTINGS)?,
            db,
        })
    }

    /// Flush every tree to disk, e.g. before snapshotting the directory.
    pub fn flush(&self) -> Result<(), RulesError> {
        self.db.flush()?;
        Ok(())
    }

    fn pack_doc_key(pack: &str, id: &str) -> Vec<u8> {
        format!("{}:{}", pack, id).into_bytes()
    }

    fn put(tree: &sled::Tree, key: &[u8], doc: &Document) -> Result<(), RulesError> {
        tree.insert(key, serde_json::to_vec(doc)?)?;
        Ok(())
    }

    fn get(tree: &sled::Tree, key: &[u8], what: &str) -> Result<Document, RulesError> {
        let Some(bytes) = tree.get(key)? else {
            return Err(RulesError::NotFound(what.to_string()));
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn scan(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<Document>, RulesError> {
        let mut out = Vec::new();
        for entry in tree.scan_prefix(prefix) {
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    pub fn put_item(&self, doc: &Document) -> Result<(), RulesError> {
        Self::put(&self.items, doc.id.as_bytes(), doc)?;
        self.items.flush()?;
        Ok(())
    }

    pub fn put_actor(&self, doc: &Document) -> Result<(), RulesError> {
        Self::put(&self.actors, doc.id.as_bytes(), doc)?;
        self.actors.flush()?;
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Result<Document, RulesError> {
        Self::get(&self.items, id.as_bytes(), &format!("item: {}", id))
    }

    pub fn get_actor(&self, id: &str) -> Result<Document, RulesError> {
        Self::get(&self.actors, id.as_bytes(), &format!("actor: {}", id))
    }

    pub fn put_pack(&self, info: &PackInfo) -> Result<(), RulesError> {
        self.packs
            .insert(info.id.as_bytes(), serde_json::to_vec(info)?)?;
        self.packs.flush()?;
        Ok(())
    }

    fn pack(&self, id: &str) -> Result<PackInfo, RulesError> {
        let Some(bytes) = self.packs.get(id.as_bytes())? else {
            return Err(RulesError::NotFound(format!("pack: {}", id)));
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Insert a document into a pack. Pack locks guard migrations, not imports.
    pub fn put_pack_document(&self, pack: &str, doc: &Document) -> Result<(), RulesError> {
        self.pack(pack)?;
        Self::put(&self.pack_docs, &Self::pack_doc_key(pack, &doc.id), doc)?;
        self.pack_docs.flush()?;
        Ok(())
    }

    pub fn get_pack_document(&self, pack: &str, id: &str) -> Result<Document, RulesError> {
        Self::get(
            &self.pack_docs,
            &Self::pack_doc_key(pack, id),
            &format!("{} in pack {}", id, pack),
        )
    }

    fn pack_of_kind(&self, pack: &str, kind: PackKind) -> Result<PackInfo, RulesError> {
        let info = self.pack(pack)?;
        if info.kind != kind {
            return Err(RulesError::NotFound(format!(
                "pack {} holds {:?} documents",
                pack, info.kind
            )));
        }
        Ok(info)
    }

    fn writable_pack(&self, pack: &str, kind: PackKind) -> Result<PackInfo, RulesError> {
        let info = self.pack_of_kind(pack, kind)?;
        if info.locked {
            return Err(RulesError::PackLocked(pack.to_string()));
        }
        Ok(info)
    }

    /// Patch each keyed document on its own.
    fn update_each(
        tree: &sled::Tree,
        patches: &[Patch],
        key_for: impl Fn(&str) -> Vec<u8>,
    ) -> Result<BulkWrite, RulesError> {
        let mut result = BulkWrite::default();
        for patch in patches {
            let key = key_for(&patch.id);
            let outcome = Self::get(tree, &key, &patch.id).and_then(|mut doc| {
                doc.apply(patch)?;
                Self::put(tree, &key, &doc)
            });
            match outcome {
                Ok(()) => result.applied += 1,
                Err(e) => result.reject(&patch.id, e),
            }
        }
        tree.flush()?;
        Ok(result)
    }

    /// Patch items embedded in one owner document, then write the owner once.
    fn update_embedded(
        tree: &sled::Tree,
        owner_key: &[u8],
        owner_id: &str,
        patches: &[Patch],
    ) -> Result<BulkWrite, RulesError> {
        let mut owner = Self::get(tree, owner_key, &format!("actor: {}", owner_id))?;
        let mut result = BulkWrite::default();
        for patch in patches {
            let Some(item) = owner.items.iter_mut().find(|i| i.id == patch.id) else {
                result.reject(&patch.id, RulesError::NotFound(format!("embedded item: {}", patch.id)));
                continue;
            };
            let mut updated = item.clone();
            match updated.apply(patch) {
                Ok(()) => {
                    *item = updated;
                    result.applied += 1;
                }
                Err(e) => result.reject(&patch.id, e),
            }
        }
        if result.applied > 0 {
            Self::put(tree, owner_key, &owner)?;
            tree.flush()?;
        }
        Ok(result)
    }
}

impl WorldStore for SledWorldStore {
    fn packs(&self) -> Result<Vec<PackInfo>, RulesError> {
        let mut out = Vec::new();
        for entry in self.packs.iter() {
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    fn documents(&self, population: &Population) -> Result<Vec<Document>, RulesError> {
        match population {
            Population::WorldItems => Self::scan(&self.items, b""),
            Population::WorldActors => Self::scan(&self.actors, b""),
            Population::EmbeddedItems { actor_id } => Ok(self.get_actor(actor_id)?.items),
            Population::PackItems { pack } => {
                self.pack_of_kind(pack, PackKind::Item)?;
                Self::scan(&self.pack_docs, format!("{}:", pack).as_bytes())
            }
            Population::PackActors { pack } => {
                self.pack_of_kind(pack, PackKind::Actor)?;
                Self::scan(&self.pack_docs, format!("{}:", pack).as_bytes())
            }
            Population::PackEmbeddedItems { pack, actor_id } => {
                self.pack_of_kind(pack, PackKind::Actor)?;
                Ok(self.get_pack_document(pack, actor_id)?.items)
            }
        }
    }

    fn bulk_update(
        &self,
        population: &Population,
        patches: &[Patch],
    ) -> Result<BulkWrite, RulesError> {
        debug!("bulk update of {} patches on {}", patches.len(), population);
        match population {
            Population::WorldItems => {
                Self::update_each(&self.items, patches, |id| id.as_bytes().to_vec())
            }
            Population::WorldActors => {
                Self::update_each(&self.actors, patches, |id| id.as_bytes().to_vec())
            }
            Population::EmbeddedItems { actor_id } => {
                Self::update_embedded(&self.actors, actor_id.as_bytes(), actor_id, patches)
            }
            Population::PackItems { pack } => {
                self.writable_pack(pack, PackKind::Item)?;
                Self::update_each(&self.pack_docs, patches, |id| Self::pack_doc_key(pack, id))
            }
            Population::PackActors { pack } => {
                self.writable_pack(pack, PackKind::Actor)?;
                Self::update_each(&self.pack_docs, patches, |id| Self::pack_doc_key(pack, id))
            }
            Population::PackEmbeddedItems { pack, actor_id } => {
                self.writable_pack(pack, PackKind::Actor)?;
                Self::update_embedded(
                    &self.pack_docs,
                    &Self::pack_doc_key(pack, actor_id),
                    actor_id,
                    patches,
                )
            }
        }
    }

    fn schema_version(&self) -> Result<Option<String>, RulesError> {
        let Some(bytes) = self.settings.get(SCHEMA_VERSION_KEY)? else {
            return Ok(None);
        };
        let tag = std::str::from_utf8(&bytes)
            .map_err(|e| RulesError::Internal(format!("schema version is not utf-8: {}", e)))?;
        Ok(Some(tag.to_string()))
    }

    fn set_schema_version(&self, version: &str) -> Result<(), RulesError> {
        self.settings
            .insert(SCHEMA_VERSION_KEY, version.as_bytes())?;
        self.settings.flush()?;
        Ok(())
    }
}

/// Compendium pack with its documents, as found in a world dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackDump {
    #[serde(flatten)]
    pub info: PackInfo,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// JSON export of a world: what the host adapter hands over for offline work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldDump {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub items: Vec<Document>,
    #[serde(default)]
    pub actors: Vec<Document>,
    #[serde(default)]
    pub packs: Vec<PackDump>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub items: usize,
    pub actors: usize,
    pub packs: usize,
    pub pack_documents: usize,
}

/// Load a world dump from a JSON file.
pub fn load_world_dump<P: AsRef<Path>>(path: P) -> Result<WorldDump, RulesError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        RulesError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse {}: {}", path.display(), e),
        ))
    })
}

impl SledWorldStore {
    /// Insert every document of `dump`. Existing documents with the same id are
    /// replaced; the stored version tag is only written when the dump has one.
    pub fn import(&self, dump: &WorldDump) -> Result<ImportCounts, RulesError> {
        let mut counts = ImportCounts::default();
        for item in &dump.items {
            self.put_item(item)?;
            counts.items += 1;
        }
        for actor in &dump.actors {
            self.put_actor(actor)?;
            counts.actors += 1;
        }
        for pack in &dump.packs {
            self.put_pack(&pack.info)?;
            counts.packs += 1;
            for doc in &pack.documents {
                self.put_pack_document(&pack.info.id, doc)?;
                counts.pack_documents += 1;
            }
        }
        if let Some(version) = &dump.schema_version {
            self.set_schema_version(version)?;
        }
        Ok(counts)
    }
}

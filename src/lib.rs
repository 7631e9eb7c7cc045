//! # Demonlord - Rules Core for Shadow of the Demon Lord Worlds
//!
//! Host-independent pieces of the Demonlord game system: the affliction gate
//! that decides whether a character may act, and the migration pipeline that
//! upgrades stored worlds between system versions.
//!
//! ## Features
//!
//! - **Affliction Gate**: blocks actions on active afflictions and builds
//!   locale-keyed effect summaries for actions and talents.
//! - **Status Effects**: token status toggles mapped onto sheet fields, and
//!   the reverse reconciliation for freshly placed tokens.
//! - **Migration Pipeline**: ordered, version-gated, idempotent transforms over
//!   world items, actors, embedded items and compendium packs, with
//!   per-population failure isolation and a version checkpoint.
//! - **World Store**: sled-backed document store with bulk patch writes and
//!   pre-migration snapshots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use demonlord::host::{FixedPrompt, LogNotifier};
//! use demonlord::migration::{Host, MigrationPipeline};
//! use demonlord::storage::SledWorldStore;
//!
//! fn main() -> Result<(), demonlord::errors::RulesError> {
//!     let store = SledWorldStore::open("./data")?;
//!     let host = Host {
//!         store: &store,
//!         session: &true,
//!         notifier: &LogNotifier,
//!         prompt: &FixedPrompt(true),
//!     };
//!     let outcome = MigrationPipeline::new("3.1.0").run(&host)?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`rules`] - affliction gate, status effects, initiative
//! - [`migration`] - schema steps and the pipeline that runs them
//! - [`storage`] - documents, patches and the world store
//! - [`host`] - collaborator traits the host application implements
//! - [`config`] - TOML configuration for the command line tool
//! - [`version`] - lenient dotted version comparison

pub mod config;
pub mod errors;
pub mod host;
pub mod logutil;
pub mod migration;
pub mod rules;
pub mod storage;
pub mod version;

//! Versioned migration steps and their per-population bookkeeping.

use std::fmt;

use log::{debug, error, info, warn};
use serde::Serialize;

use super::transforms::{
    actor_icon_patch, character_reset_patch, corruption_tracking, item_icon_patch,
    strength_requirement, template_backfill_patch, ActorTemplates, DefaultIcons,
};
use crate::errors::RulesError;
use crate::host::Prompt;
use crate::logutil::escape_log;
use crate::storage::{combine, Document, PackInfo, PackKind, Patch, Population, WorldStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// A population (or the pack list) could not be read.
    Read,
    /// A transform refused a record.
    Predicate,
    /// The bulk update failed or rejected a record.
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Read => "read",
            FailureKind::Predicate => "predicate",
            FailureKind::Write => "write",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub population: String,
    pub record_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one step. Failures are collected, never raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub step: String,
    pub populations: usize,
    pub records_read: usize,
    pub records_patched: usize,
    pub failures: Vec<StepFailure>,
}

impl StepReport {
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    fn add_failure(
        &mut self,
        population: impl fmt::Display,
        record_id: Option<&str>,
        kind: FailureKind,
        message: impl fmt::Display,
    ) {
        let message = message.to_string();
        match record_id {
            Some(id) => error!(
                "migration {}: {} failure on {} record {}: {}",
                self.step, kind, population, id, message
            ),
            None => error!(
                "migration {}: {} failure on {}: {}",
                self.step, kind, population, message
            ),
        }
        self.failures.push(StepFailure {
            population: population.to_string(),
            record_id: record_id.map(str::to_string),
            kind,
            message,
        });
    }
}

/// Everything a step needs besides the store.
pub struct StepContext<'a> {
    pub store: &'a dyn WorldStore,
    pub prompt: &'a dyn Prompt,
    pub dry_run: bool,
    /// Pre-answered default-icon question; asked through `prompt` when unset.
    pub default_icons: Option<bool>,
    pub icons: &'a DefaultIcons,
    pub templates: &'a ActorTemplates,
}

type Transform<'t> = dyn Fn(&Document) -> Result<Option<Patch>, RulesError> + 't;

impl StepContext<'_> {
    /// Read one population, run `transform` over every record and write the
    /// resulting patches in a single bulk update. Returns the records read, or
    /// `None` when the read itself failed.
    fn migrate_population(
        &self,
        report: &mut StepReport,
        population: Population,
        transform: &Transform<'_>,
    ) -> Option<Vec<Document>> {
        report.populations += 1;
        let docs = match self.store.documents(&population) {
            Ok(docs) => docs,
            Err(e) => {
                report.add_failure(&population, None, FailureKind::Read, e);
                return None;
            }
        };
        report.records_read += docs.len();

        let mut patches = Vec::new();
        for doc in &docs {
            match transform(doc) {
                Ok(Some(patch)) => {
                    debug!("migrating {} '{}' in {}", doc.kind, escape_log(&doc.name), population);
                    patches.push(patch);
                }
                Ok(None) => {}
                Err(e) => report.add_failure(&population, Some(doc.id.as_str()), FailureKind::Predicate, e),
            }
        }
        if patches.is_empty() {
            return Some(docs);
        }

        if self.dry_run {
            info!("dry run: {} patches for {}", patches.len(), population);
            for patch in &patches {
                match serde_json::to_string(patch) {
                    Ok(json) => info!("dry run: {}", json),
                    Err(e) => warn!("dry run: cannot render patch for {}: {}", patch.id, e),
                }
            }
            report.records_patched += patches.len();
            return Some(docs);
        }

        match self.store.bulk_update(&population, &patches) {
            Ok(written) => {
                report.records_patched += written.applied;
                for (id, reason) in written.rejected {
                    report.add_failure(&population, Some(id.as_str()), FailureKind::Write, reason);
                }
            }
            Err(e) => report.add_failure(&population, None, FailureKind::Write, e),
        }
        Some(docs)
    }

    fn packs(&self, report: &mut StepReport, kind: PackKind) -> Vec<PackInfo> {
        match self.store.packs() {
            Ok(packs) => packs
                .into_iter()
                .filter(|p| p.kind == kind)
                .filter(|p| {
                    if p.locked {
                        debug!("skipping locked pack {}", p.id);
                    }
                    !p.locked
                })
                .collect(),
            Err(e) => {
                report.add_failure("compendium packs", None, FailureKind::Read, e);
                Vec::new()
            }
        }
    }
}

fn infallible(f: impl Fn(&Document) -> Option<Patch>) -> impl Fn(&Document) -> Result<Option<Patch>, RulesError> {
    move |doc| Ok(f(doc))
}

/// The known schema steps, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// Backfill actor data from the type templates.
    V1_7_7,
    /// New icon tree, optional default icons, character reset.
    V2_0_0,
    /// Structured strength requirement and tracked corruption.
    V3_1_0,
}

impl MigrationStep {
    pub const ALL: [MigrationStep; 3] = [
        MigrationStep::V1_7_7,
        MigrationStep::V2_0_0,
        MigrationStep::V3_1_0,
    ];

    /// The step runs when the stored version is strictly below this.
    pub fn threshold(self) -> &'static str {
        match self {
            MigrationStep::V1_7_7 => "1.7.7",
            MigrationStep::V2_0_0 => "2.0.0",
            MigrationStep::V3_1_0 => "3.1.0",
        }
    }

    /// Steps written against the legacy host data layout.
    pub fn legacy_host_only(self) -> bool {
        matches!(self, MigrationStep::V1_7_7 | MigrationStep::V2_0_0)
    }

    pub fn run(self, ctx: &StepContext<'_>) -> StepReport {
        let mut report = StepReport::new(self.threshold());
        info!("running migration step {}", self.threshold());
        match self {
            MigrationStep::V1_7_7 => migrate_1_7_7(ctx, &mut report),
            MigrationStep::V2_0_0 => migrate_2_0_0(ctx, &mut report),
            MigrationStep::V3_1_0 => migrate_3_1_0(ctx, &mut report),
        }
        info!(
            "migration step {}: {} populations, {} read, {} patched, {} failures",
            report.step,
            report.populations,
            report.records_read,
            report.records_patched,
            report.failures.len()
        );
        report
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.threshold())
    }
}

/// Items of this era need no change.
fn migrate_1_7_7(ctx: &StepContext<'_>, report: &mut StepReport) {
    ctx.migrate_population(
        report,
        Population::WorldActors,
        &infallible(|actor| template_backfill_patch(actor, ctx.templates)),
    );
}

fn migrate_2_0_0(ctx: &StepContext<'_>, report: &mut StepReport) {
    let use_defaults = ctx.default_icons.unwrap_or_else(|| {
        ctx.prompt.confirm(
            "Default icons",
            "Do you want to migrate current default item icons to the new ones?\n\
             The new icons will be set only for items that have the \"mystery-man\" icon.",
            true,
        )
    });
    let defaults = use_defaults.then_some(ctx.icons);
    let item_icons = infallible(move |item| item_icon_patch(item, defaults));

    ctx.migrate_population(report, Population::WorldItems, &item_icons);

    let actors = ctx.migrate_population(
        report,
        Population::WorldActors,
        &infallible(|actor| combine([actor_icon_patch(actor), character_reset_patch(actor)])),
    );
    for actor in actors.unwrap_or_default() {
        ctx.migrate_population(
            report,
            Population::EmbeddedItems { actor_id: actor.id },
            &item_icons,
        );
    }
}

fn migrate_3_1_0(ctx: &StepContext<'_>, report: &mut StepReport) {
    ctx.migrate_population(report, Population::WorldItems, &strength_requirement);

    let actors = ctx.migrate_population(report, Population::WorldActors, &corruption_tracking);
    for actor in actors.unwrap_or_default() {
        ctx.migrate_population(
            report,
            Population::EmbeddedItems { actor_id: actor.id },
            &strength_requirement,
        );
    }

    for pack in ctx.packs(report, PackKind::Item) {
        ctx.migrate_population(
            report,
            Population::PackItems { pack: pack.id },
            &strength_requirement,
        );
    }

    for pack in ctx.packs(report, PackKind::Actor) {
        let actors = ctx.migrate_population(
            report,
            Population::PackActors {
                pack: pack.id.clone(),
            },
            &corruption_tracking,
        );
        for actor in actors.unwrap_or_default() {
            ctx.migrate_population(
                report,
                Population::PackEmbeddedItems {
                    pack: pack.id.clone(),
                    actor_id: actor.id,
                },
                &strength_requirement,
            );
        }
    }
}

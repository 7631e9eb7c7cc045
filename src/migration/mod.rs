//! # Migration Module - World Schema Upgrades
//!
//! Brings a world's stored documents up to the running system version.
//!
//! ## Run sequence
//!
//! 1. **Check**: only the game master migrates. A world with no stored version
//!    is new: the running version is stamped and nothing else happens.
//! 2. **Compatibility**: worlds older than the minimum compatible version on a
//!    legacy host get a persistent warning; the run continues.
//! 3. **Execute**: each [`MigrationStep`] whose threshold is above the stored
//!    version runs, oldest first. A step reads, transforms and bulk-writes
//!    each population on its own; failures are collected in a
//!    [`StepReport`] and never stop later populations or steps.
//! 4. **Checkpoint**: the running version is stamped whatever the steps
//!    reported, so a failing record does not re-run every step on each start.
//!
//! Dry runs read and transform everything, log the patches, and write nothing
//! (the checkpoint included).

pub mod steps;
pub mod transforms;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::errors::RulesError;
use crate::host::{Notifier, Prompt, Session};
use crate::storage::WorldStore;
use crate::version::{is_newer, Version};

pub use steps::{FailureKind, MigrationStep, StepContext, StepFailure, StepReport};
pub use transforms::{ActorTemplates, DefaultIcons, PathIcons};

/// Oldest stored version the steps were written to handle reliably.
pub const DEFAULT_MINIMUM_COMPATIBLE_VERSION: &str = "0.8";

/// Host collaborators a run talks to.
pub struct Host<'a> {
    pub store: &'a dyn WorldStore,
    pub session: &'a dyn Session,
    pub notifier: &'a dyn Notifier,
    pub prompt: &'a dyn Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Checkpoint {
    Stamped,
    /// Dry runs leave the stored version alone.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub from_version: String,
    pub to_version: String,
    pub dry_run: bool,
    pub compatibility_warning: bool,
    pub steps: Vec<StepReport>,
    pub checkpoint: Checkpoint,
}

impl MigrationReport {
    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(StepReport::has_errors)
            || matches!(self.checkpoint, Checkpoint::Failed(_))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &StepFailure)> {
        self.steps
            .iter()
            .flat_map(|s| s.failures.iter().map(move |f| (s.step.as_str(), f)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The session may not migrate; nothing was read or written.
    NotPermitted,
    /// No stored version: the running version was stamped.
    FirstRun { stamped: String },
    Completed(MigrationReport),
}

#[derive(Debug, Clone)]
pub struct MigrationPipeline {
    running_version: String,
    minimum_compatible_version: String,
    /// Host data-layout generation; `None` means the legacy layout.
    host_generation: Option<u32>,
    dry_run: bool,
    default_icons: Option<bool>,
    icons: DefaultIcons,
    templates: ActorTemplates,
}

impl MigrationPipeline {
    pub fn new(running_version: &str) -> Self {
        Self {
            running_version: running_version.to_string(),
            minimum_compatible_version: DEFAULT_MINIMUM_COMPATIBLE_VERSION.to_string(),
            host_generation: None,
            dry_run: false,
            default_icons: None,
            icons: DefaultIcons::default(),
            templates: ActorTemplates::default(),
        }
    }

    pub fn with_minimum_compatible_version(mut self, version: &str) -> Self {
        self.minimum_compatible_version = version.to_string();
        self
    }

    pub fn with_host_generation(mut self, generation: Option<u32>) -> Self {
        self.host_generation = generation;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pre-answers the default-icon question of step 2.0.0.
    pub fn with_default_icons(mut self, answer: Option<bool>) -> Self {
        self.default_icons = answer;
        self
    }

    pub fn with_icons(mut self, icons: DefaultIcons) -> Self {
        self.icons = icons;
        self
    }

    pub fn with_templates(mut self, templates: ActorTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn running_version(&self) -> &str {
        &self.running_version
    }

    fn is_legacy_host(&self) -> bool {
        self.host_generation.is_none()
    }

    /// Steps a world at `stored` would run, in order.
    pub fn pending_steps(&self, stored: &str) -> Result<Vec<MigrationStep>, RulesError> {
        let mut pending = Vec::new();
        for step in MigrationStep::ALL {
            if step.legacy_host_only() && !self.is_legacy_host() {
                continue;
            }
            if is_newer(step.threshold(), stored)? {
                pending.push(step);
            }
        }
        Ok(pending)
    }

    fn start_banner(&self) -> String {
        format!(
            "Applying Demonlord System Migration for version {}. Please be patient and do not close your game or shut down your server.",
            self.running_version
        )
    }

    fn success_banner(&self) -> String {
        format!(
            "Demonlord System Migration to version {} completed!",
            self.running_version
        )
    }

    fn error_banner(&self) -> String {
        format!(
            "Demonlord System Migration to version {} error",
            self.running_version
        )
    }

    /// Runs the whole sequence. Errors are only returned for problems found
    /// before any step ran (unreadable or unparsable stored version); step
    /// failures end up in the report.
    pub fn run(&self, host: &Host<'_>) -> Result<MigrationOutcome, RulesError> {
        if !host.session.is_gamemaster() {
            debug!("migration skipped: session is not the game master");
            return Ok(MigrationOutcome::NotPermitted);
        }
        Version::parse(&self.running_version)?;

        let stored = host
            .store
            .schema_version()?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let Some(stored) = stored else {
            info!("no stored schema version, stamping {}", self.running_version);
            if !self.dry_run {
                host.store.set_schema_version(&self.running_version)?;
            }
            return Ok(MigrationOutcome::FirstRun {
                stamped: self.running_version.clone(),
            });
        };
        Version::parse(&stored)?;

        let compatibility_warning =
            self.is_legacy_host() && is_newer(&self.minimum_compatible_version, &stored)?;
        if compatibility_warning {
            warn!(
                "stored schema {} predates minimum compatible {}",
                stored, self.minimum_compatible_version
            );
            host.notifier.error(
                "Your Demonlord system data is from too old a Foundry version and cannot be reliably migrated to the latest version. The process will be attempted, but errors may occur.",
                true,
            );
        }

        let pending = self.pending_steps(&stored)?;
        info!(
            "migrating world from {} to {}: {} step(s) pending{}",
            stored,
            self.running_version,
            pending.len(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        let ctx = StepContext {
            store: host.store,
            prompt: host.prompt,
            dry_run: self.dry_run,
            default_icons: self.default_icons,
            icons: &self.icons,
            templates: &self.templates,
        };
        let mut steps = Vec::with_capacity(pending.len());
        for step in pending {
            host.notifier.info(&self.start_banner(), true);
            let report = step.run(&ctx);
            if report.has_errors() {
                host.notifier.error(&self.error_banner(), true);
            } else {
                host.notifier.info(&self.success_banner(), true);
            }
            steps.push(report);
        }

        let checkpoint = if self.dry_run {
            Checkpoint::Skipped
        } else {
            match host.store.set_schema_version(&self.running_version) {
                Ok(()) => Checkpoint::Stamped,
                Err(e) => {
                    error!("failed to stamp schema version {}: {}", self.running_version, e);
                    Checkpoint::Failed(e.to_string())
                }
            }
        };

        Ok(MigrationOutcome::Completed(MigrationReport {
            from_version: stored,
            to_version: self.running_version.clone(),
            dry_run: self.dry_run,
            compatibility_warning,
            steps,
            checkpoint,
        }))
    }
}

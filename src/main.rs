//! Binary entrypoint for the demonlord CLI.
//!
//! Commands:
//! - `init` - write a starter `demonlord.toml` and create the data directory
//! - `status` - stored vs running schema version, pending steps, snapshots
//! - `import <dump.json>` - load a world export into the store
//! - `migrate [--dry-run] [--icons yes|no] [--no-backup]` - run pending migrations
//! - `snapshot` - archive the world store now
//! - `restore <snapshot-id>` - replace the world store with a verified snapshot
//! - `gate <actor> --block <affliction>...` - check whether afflictions block an action
//! - `effects <actor> --kind <KIND> --effect <name>... --magnitude <m>` - action effect summary
//! - `talent <item> [--actor <id>] [--show-name] [--scope TALENT|ROLL]` - talent effect summary
//! - `status-effect <actor> <Label> --on|--off` - toggle a token status on the sheet
//! - `token-sync <actor> [--shown <id>...]` - icon toggles a token needs
//! - `initiative <actor>` - fixed-phase initiative
//!
//! See the library crate docs for module-level details: `demonlord::`.
use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use demonlord::config::Config;
use demonlord::host::{CatalogLocalizer, FixedPrompt, Localizer, LogNotifier, Prompt, StdinPrompt};
use demonlord::migration::{Checkpoint, Host, MigrationOutcome};
use demonlord::rules::{
    actor_initiative, apply_status_effect, token_sync, Affliction, AfflictionGate, CharacterSheet,
    Gate, Talent, TalentScope,
};
use demonlord::storage::backup::{SnapshotManager, SnapshotReason};
use demonlord::storage::{load_world_dump, Document, Population, SledWorldStore, WorldStore};

#[derive(Parser)]
#[command(name = "demonlord")]
#[command(about = "Affliction gate and world migrations for Shadow of the Demon Lord worlds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "demonlord.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Answer {
    Yes,
    No,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Show schema version, pending migration steps and snapshots
    Status,
    /// Import a JSON world export into the store
    Import {
        /// Path to the export
        file: PathBuf,
    },
    /// Run pending schema migrations
    Migrate {
        /// Log the patches without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Answer the default-icon question up front
        #[arg(long, value_enum)]
        icons: Option<Answer>,
        /// Skip the pre-migration snapshot
        #[arg(long)]
        no_backup: bool,
    },
    /// Archive the world store
    Snapshot,
    /// Replace the world store with a snapshot; the current data is kept aside
    Restore {
        /// Snapshot id as listed by `status`
        id: String,
    },
    /// Check whether any of the given afflictions blocks the actor
    Gate {
        actor: String,
        /// Blocking afflictions, in priority order
        #[arg(short, long = "block", required = true)]
        blocking: Vec<String>,
        /// Only block when this is true
        #[arg(long)]
        when: Option<bool>,
    },
    /// Effect lines for an action kind (SPELL, CHALLENGE, ATTACK)
    Effects {
        actor: String,
        #[arg(short, long)]
        kind: String,
        /// Affliction or action-state names to report when active
        #[arg(short, long = "effect")]
        effects: Vec<String>,
        #[arg(short, long, default_value = "1")]
        magnitude: String,
    },
    /// Effect summary of a talent
    Talent {
        item: String,
        /// Owning actor when the talent is embedded
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        show_name: bool,
        /// TALENT includes challenge, opposed, healing and bonus lines
        #[arg(long, default_value = "TALENT")]
        scope: String,
    },
    /// Apply a token status toggle to the actor sheet
    StatusEffect {
        actor: String,
        /// Status label as shown by the host, e.g. Asleep
        label: String,
        #[arg(long, conflicts_with = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
    },
    /// List the icon toggles that make a token mirror its actor
    TokenSync {
        actor: String,
        /// Status ids currently shown on the token
        #[arg(long)]
        shown: Vec<String>,
    },
    /// Initiative for the actor's phase
    Initiative { actor: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    if !matches!(cli.command, Commands::Init) {
        init_logging(&pre_config, cli.verbose);
    }

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            let config = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            println!("Created {} (data directory {})", cli.config, config.storage.data_dir);
        }
        Commands::Status => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let pipeline = config.pipeline()?;
            println!("Running version: {}", pipeline.running_version());
            match store.schema_version()? {
                Some(stored) => {
                    println!("Stored version:  {}", stored);
                    let pending = pipeline.pending_steps(&stored)?;
                    if pending.is_empty() {
                        println!("No migration pending.");
                    } else {
                        let names: Vec<String> = pending.iter().map(|s| s.to_string()).collect();
                        println!("Pending steps:   {}", names.join(", "));
                    }
                }
                None => println!("Stored version:  (none, first run)"),
            }
            let packs = store.packs()?;
            let locked = packs.iter().filter(|p| p.locked).count();
            println!("Compendium packs: {} ({} locked)", packs.len(), locked);
            for snapshot in snapshot_manager(&config)?.list() {
                println!(
                    "Snapshot {} {} {} bytes{}",
                    snapshot.id,
                    snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                    snapshot.size_bytes,
                    if snapshot.verified { " (verified)" } else { "" }
                );
            }
        }
        Commands::Import { file } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let dump = load_world_dump(&file)?;
            let counts = store.import(&dump)?;
            info!("Imported {}: {:?}", file.display(), counts);
            println!(
                "Imported {} items, {} actors, {} packs ({} pack documents)",
                counts.items, counts.actors, counts.packs, counts.pack_documents
            );
        }
        Commands::Migrate {
            dry_run,
            icons,
            no_backup,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            run_migration(&config, dry_run, icons, no_backup)?;
        }
        Commands::Snapshot => {
            let config = require_config(pre_config, &cli.config).await?;
            {
                let store = open_store(&config)?;
                store.flush()?;
            }
            let snapshot = snapshot_manager(&config)?.create(SnapshotReason::Manual)?;
            println!(
                "Snapshot {} written to {} ({} bytes)",
                snapshot.id, config.migration.backup_dir, snapshot.size_bytes
            );
        }
        Commands::Restore { id } => {
            let config = require_config(pre_config, &cli.config).await?;
            let mut snapshots = snapshot_manager(&config)?;
            let reason = snapshots
                .get(&id)
                .map(|s| s.reason.clone())
                .ok_or_else(|| anyhow!("snapshot {} not found", id))?;
            if !snapshots.verify(&id)? {
                return Err(anyhow!("snapshot {} failed checksum verification", id));
            }
            match reason {
                SnapshotReason::PreMigration { from, to } => {
                    info!("Restoring snapshot {} taken before migrating {} -> {}", id, from, to)
                }
                SnapshotReason::Manual => info!("Restoring manual snapshot {}", id),
            }
            match snapshots.rollback(&id)? {
                Some(aside) => println!(
                    "Restored {} into {}; previous data kept at {}",
                    id,
                    config.storage.data_dir,
                    aside.display()
                ),
                None => println!("Restored {} into {}", id, config.storage.data_dir),
            }
        }
        Commands::Gate {
            actor,
            blocking,
            when,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let sheet = CharacterSheet::from_document(&store.get_actor(&actor)?)?;
            let blocking = blocking
                .iter()
                .map(|name| name.parse::<Affliction>())
                .collect::<Result<Vec<_>, _>>()?;
            let gate = AfflictionGate::default();
            let verdict = match (when, blocking.as_slice()) {
                (Some(condition), [single]) => gate.is_conditionally_blocked(&sheet, *single, condition),
                (Some(_), _) => return Err(anyhow!("--when takes exactly one --block affliction")),
                (None, list) => gate.is_blocked(&sheet, list),
            };
            match verdict {
                Gate::Clear => println!("clear"),
                Gate::Blocked { affliction, warning } => {
                    let catalog = localizer(&config)?;
                    let message = warning
                        .map(|key| catalog.localize(key.as_str()))
                        .unwrap_or_default();
                    println!("blocked by {:?} {}", affliction, message);
                }
            }
        }
        Commands::Effects {
            actor,
            kind,
            effects,
            magnitude,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let sheet = CharacterSheet::from_document(&store.get_actor(&actor)?)?;
            let effects: Vec<&str> = effects.iter().map(String::as_str).collect();
            let summary = AfflictionGate::default()
                .build_action_effect_summary(&sheet, &kind, &effects, &magnitude)
                .ok_or_else(|| anyhow!("unknown action kind {}", kind))?;
            println!("{}", summary.render_html(&localizer(&config)?));
        }
        Commands::Talent {
            item,
            actor,
            show_name,
            scope,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let doc = find_item(&store, &item, actor.as_deref())?;
            let talent = Talent::from_document(&doc)?;
            let summary = AfflictionGate::default().build_talent_effect_summary(
                &talent,
                show_name,
                TalentScope::from_kind(&scope),
            );
            println!("{}", summary.render_html(&localizer(&config)?));
        }
        Commands::StatusEffect {
            actor,
            label,
            on,
            off,
        } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            if on == off {
                return Err(anyhow!("pass exactly one of --on or --off"));
            }
            let patch = apply_status_effect(&actor, &label, on)
                .ok_or_else(|| demonlord::errors::RulesError::UnknownLabel(label.clone()))?;
            let written = store.bulk_update(&Population::WorldActors, &[patch])?;
            if let Some((id, reason)) = written.rejected.first() {
                return Err(anyhow!("failed to update {}: {}", id, reason));
            }
            println!("{} {} on {}", label, if on { "set" } else { "cleared" }, actor);
        }
        Commands::TokenSync { actor, shown } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let shown: BTreeSet<String> = shown.into_iter().collect();
            for toggle in token_sync(&store.get_actor(&actor)?, &shown)? {
                println!("{} {}", if toggle.enable { "+" } else { "-" }, toggle.id);
            }
        }
        Commands::Initiative { actor } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            println!("{}", actor_initiative(&store.get_actor(&actor)?)?);
        }
    }

    Ok(())
}

async fn require_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

fn open_store(config: &Config) -> Result<SledWorldStore> {
    SledWorldStore::open(&config.storage.data_dir)
        .map_err(|e| anyhow!("Failed to open world store {}: {}", config.storage.data_dir, e))
}

fn snapshot_manager(config: &Config) -> Result<SnapshotManager> {
    SnapshotManager::new(
        PathBuf::from(&config.storage.data_dir),
        PathBuf::from(&config.migration.backup_dir),
        config.migration.keep_backups,
    )
    .map_err(|e| anyhow!("Failed to open snapshot directory {}: {}", config.migration.backup_dir, e))
}

fn localizer(config: &Config) -> Result<CatalogLocalizer> {
    match &config.system.locale_file {
        Some(path) => CatalogLocalizer::load(path)
            .map_err(|e| anyhow!("Failed to load locale file {}: {}", path, e)),
        None => Ok(CatalogLocalizer::default()),
    }
}

fn find_item(store: &SledWorldStore, item: &str, actor: Option<&str>) -> Result<Document> {
    match actor {
        None => Ok(store.get_item(item)?),
        Some(actor_id) => store
            .documents(&Population::EmbeddedItems {
                actor_id: actor_id.to_string(),
            })?
            .into_iter()
            .find(|doc| doc.id == item)
            .ok_or_else(|| anyhow!("item {} not found on actor {}", item, actor_id)),
    }
}

fn run_migration(config: &Config, dry_run: bool, icons: Option<Answer>, no_backup: bool) -> Result<()> {
    let store = open_store(config)?;
    let dry_run = dry_run || config.migration.dry_run;
    let icons = icons
        .map(|a| matches!(a, Answer::Yes))
        .or(config.migration.default_icons);
    let pipeline = config
        .pipeline()?
        .with_dry_run(dry_run)
        .with_default_icons(icons);

    if config.migration.backup_before_migrate && !no_backup && !dry_run {
        if let Some(stored) = store.schema_version()?.filter(|v| !v.trim().is_empty()) {
            if !pipeline.pending_steps(&stored)?.is_empty() {
                store.flush()?;
                let snapshot = snapshot_manager(config)?
                    .create(SnapshotReason::PreMigration {
                        from: stored.clone(),
                        to: pipeline.running_version().to_string(),
                    })
                    .map_err(|e| anyhow!("Pre-migration snapshot failed, nothing migrated: {}", e))?;
                println!("Snapshot {} written to {}", snapshot.id, config.migration.backup_dir);
            }
        }
    }

    let prompt: Box<dyn Prompt> = if atty::is(atty::Stream::Stdin) {
        Box::new(StdinPrompt)
    } else {
        Box::new(FixedPrompt(true))
    };
    let host = Host {
        store: &store,
        session: &true,
        notifier: &LogNotifier,
        prompt: prompt.as_ref(),
    };

    match pipeline.run(&host)? {
        MigrationOutcome::NotPermitted => println!("Migration skipped: not permitted"),
        MigrationOutcome::FirstRun { stamped } => println!("New world stamped at {}", stamped),
        MigrationOutcome::Completed(report) => {
            for step in &report.steps {
                println!(
                    "{}: {} read, {} patched, {} failure(s)",
                    step.step,
                    step.records_read,
                    step.records_patched,
                    step.failures.len()
                );
            }
            for (step, failure) in report.failures() {
                println!(
                    "  {} {} {} {}: {}",
                    step,
                    failure.kind,
                    failure.population,
                    failure.record_id.as_deref().unwrap_or("-"),
                    failure.message
                );
            }
            match &report.checkpoint {
                Checkpoint::Stamped => println!("Schema version now {}", report.to_version),
                Checkpoint::Skipped => println!("Dry run: schema version left at {}", report.from_version),
                Checkpoint::Failed(e) => warn!("Schema version not stamped: {}", e),
            }
            if report.has_errors() {
                return Err(anyhow!("migration finished with errors"));
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when someone is watching.
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}

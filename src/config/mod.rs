//! # Configuration Management Module
//!
//! Settings for the `demonlord` command line tool, stored as TOML.
//!
//! ## Configuration Structure
//!
//! - [`SystemConfig`] - running system version and host compatibility
//! - [`StorageConfig`] - where the world store lives
//! - [`LoggingConfig`] - log level and optional log file
//! - [`MigrationConfig`] - dry runs, backups, default-icon answer, templates
//! - `icons` - replacement icons for placeholder item images
//!
//! ## Usage
//!
//! ```rust,no_run
//! use demonlord::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("demonlord.toml").await?;
//!     let config = Config::load("demonlord.toml").await?;
//!     println!("Running version: {}", config.system.version);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [system]
//! version = "3.1.0"
//! minimum_compatible_version = "0.8"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [migration]
//! dry_run = false
//! backup_before_migrate = true
//! backup_dir = "./backups"
//! keep_backups = 5
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::migration::{
    ActorTemplates, DefaultIcons, MigrationPipeline, DEFAULT_MINIMUM_COMPATIBLE_VERSION,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub icons: DefaultIcons,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Version the world is migrated to.
    #[serde(default = "default_system_version")]
    pub version: String,
    #[serde(default = "default_minimum_compatible_version")]
    pub minimum_compatible_version: String,
    /// Host data-layout generation. Leave unset for legacy hosts.
    #[serde(default)]
    pub host_generation: Option<u32>,
    /// Locale catalog (`lang/en.json` style) used when rendering summaries.
    #[serde(default)]
    pub locale_file: Option<String>,
}

fn default_system_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_minimum_compatible_version() -> String {
    DEFAULT_MINIMUM_COMPATIBLE_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub backup_before_migrate: bool,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Oldest backups beyond this count are pruned after each new one.
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
    /// Answer to the default-icon question; asked interactively when unset.
    #[serde(default)]
    pub default_icons: Option<bool>,
    /// System `template.json` for the actor backfill; built-in templates otherwise.
    #[serde(default)]
    pub template_file: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_backup_dir() -> String {
    "./backups".to_string()
}

fn default_keep_backups() -> usize {
    5
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_before_migrate: true,
            backup_dir: default_backup_dir(),
            keep_backups: default_keep_backups(),
            default_icons: None,
            template_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Migration pipeline for this configuration.
    pub fn pipeline(&self) -> Result<MigrationPipeline> {
        let templates = match &self.migration.template_file {
            Some(path) => ActorTemplates::load(path)
                .map_err(|e| anyhow!("Failed to load actor templates {}: {}", path, e))?,
            None => ActorTemplates::default(),
        };
        Ok(MigrationPipeline::new(&self.system.version)
            .with_minimum_compatible_version(&self.system.minimum_compatible_version)
            .with_host_generation(self.system.host_generation)
            .with_dry_run(self.migration.dry_run)
            .with_default_icons(self.migration.default_icons)
            .with_icons(self.icons.clone())
            .with_templates(templates))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            system: SystemConfig {
                version: default_system_version(),
                minimum_compatible_version: default_minimum_compatible_version(),
                host_generation: None,
                locale_file: None,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("demonlord.log".to_string()),
            },
            migration: MigrationConfig::default(),
            icons: DefaultIcons::default(),
        }
    }
}

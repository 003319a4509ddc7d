//! `.dcmcrawl.toml` configuration files
//!
//! Precedence order (highest to lowest):
//! 1. Command-line arguments
//! 2. Project config (./.dcmcrawl.toml)
//! 3. User config (~/.dcmcrawl.toml)
//! 4. Built-in defaults

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file name, both in the home and the current directory
pub const CONFIG_FILE: &str = ".dcmcrawl.toml";

/// Template written by `dcmcrawl config init`
pub const DEFAULT_CONFIG: &str = r#"# dcmcrawl configuration file

[crawl]
# Rows buffered before each write to the output file
# batch_size = 10000

# Output field delimiter (a single ASCII character)
# delimiter = "|"

# Gzip-compress the output (each batch is appended as a gzip member)
# gzip = true

# Output file
# output = "~/crawl_results.psv.gz"

# Image file extensions for `dcmcrawl scan`
# extensions = ["dcm"]

# Subject lookup: postgres, xnat, or none
# identity = "postgres"

# Credentials file used by the postgres and xnat lookups
# credentials = "~/.dcmcrawl/credentials.toml"
"#;

/// Subject lookup backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// Query the XNAT PostgreSQL database
    Postgres,
    /// Query the XNAT REST API
    Xnat,
    /// Leave the subject column empty
    None,
}

/// Configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Default settings for the crawl commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl: Option<CrawlConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Rows buffered before each write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Output field delimiter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    /// Gzip-compress the output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gzip: Option<bool>,

    /// Output file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Image file extensions for directory trees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    /// Subject lookup backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityBackend>,

    /// Credentials file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,
}

impl CrawlConfig {
    /// Overlay the keys set in `other`
    fn apply(&mut self, other: Self) {
        if other.batch_size.is_some() {
            self.batch_size = other.batch_size;
        }
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.gzip.is_some() {
            self.gzip = other.gzip;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.extensions.is_some() {
            self.extensions = other.extensions;
        }
        if other.identity.is_some() {
            self.identity = other.identity;
        }
        if other.credentials.is_some() {
            self.credentials = other.credentials;
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Path of the user config (~/.dcmcrawl.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE))
    }

    /// Path of the project config (./.dcmcrawl.toml)
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE)
    }

    /// Find and load configuration files
    /// Returns (`user_config`, `project_config`)
    pub fn discover_configs() -> (Option<Self>, Option<Self>) {
        let user_config = Self::user_config_path().and_then(|path| Self::load_optional(&path));
        let project_config = Self::load_optional(&Self::project_config_path());
        (user_config, project_config)
    }

    fn load_optional(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!(
                    "{} Ignoring config {}: {e:#}",
                    "Warning:".yellow().bold(),
                    path.display()
                );
                None
            }
        }
    }

    /// Merge configs with precedence project > user > defaults
    pub fn merge(user_config: Option<Self>, project_config: Option<Self>) -> Self {
        let mut crawl: Option<CrawlConfig> = None;

        for config in [user_config, project_config].into_iter().flatten() {
            if let Some(layer) = config.crawl {
                crawl.get_or_insert_with(CrawlConfig::default).apply(layer);
            }
        }

        Self { crawl }
    }

    /// Crawl settings, or all-unset when no config defines them
    pub fn crawl_or_default(&self) -> CrawlConfig {
        self.crawl.clone().unwrap_or_default()
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

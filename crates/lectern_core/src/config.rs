//! Store configuration.
//!
//! # Responsibility
//! - Describe where dataset files live and how queries are retried.
//! - Load and validate TOML configuration.
//!
//! # Invariants
//! - Dataset files live in the fixed `databases/` subdirectory of `data_dir`.
//! - `page_size` is never zero.

use crate::provision::DirectoryBundle;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATABASE_SUBDIR: &str = "databases";

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Application private storage root.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub default_dataset: Option<String>,
    #[serde(default)]
    pub bundle: Option<BundleConfig>,
}

/// Directory-backed bundle: `root` plus a fixed name-to-file mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

fn default_data_dir() -> PathBuf {
    std::env::temp_dir().join("lectern")
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_slow_query_ms() -> u64 {
    250
}
fn default_page_size() -> u32 {
    50
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            slow_query_ms: default_slow_query_ms(),
            page_size: default_page_size(),
            default_dataset: None,
            bundle: None,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join(DATABASE_SUBDIR)
    }

    /// Local file for dataset `name`; the name doubles as the file name.
    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.database_dir().join(name)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }

    /// Builds the configured directory bundle, if any.
    pub fn directory_bundle(&self) -> Option<DirectoryBundle> {
        self.bundle.as_ref().map(|bundle| {
            bundle
                .assets
                .iter()
                .fold(DirectoryBundle::new(&bundle.root), |acc, (name, file)| {
                    acc.with_asset(name.clone(), file)
                })
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir cannot be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be > 0".to_string()));
        }
        if let Some(bundle) = &self.bundle {
            for name in bundle.assets.keys() {
                if !is_valid_dataset_name(name) {
                    return Err(ConfigError::Invalid(format!(
                        "invalid dataset name `{name}` in bundle.assets"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dataset names become file names, so they must be a single path component.
pub fn is_valid_dataset_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed == name
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config file `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config file: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<StoreConfig, ConfigError> {
    let config: StoreConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

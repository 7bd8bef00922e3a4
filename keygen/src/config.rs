//! Configuration for the keypair generator
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! command-line overrides applied by the binary.

use crate::error::{KeygenError, Result};
use crate::filter::CandidateFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Filename prefix for written keypairs
pub const DEFAULT_FILE_PREFIX: &str = "spring-83-keypair";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of search workers (0 = one per available CPU)
    pub workers: usize,

    /// Extra regex the hex-encoded public key must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vanity: Option<String>,

    /// Directory the keypair file is written to
    pub output_dir: PathBuf,

    /// Prefix of the keypair filename
    pub file_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workers: 0,
            vanity: None,
            output_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.into(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("spring83-keygen").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("spring83-keygen.toml"))
    }

    /// Load configuration from `path`, or from the default location if present.
    ///
    /// An explicitly given file must exist; a missing default file just
    /// means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(KeygenError::Config(format!(
                    "Configuration file {:?} does not exist",
                    path
                )));
            }
            debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() {
            return Err(KeygenError::Config("file_prefix must not be empty".into()));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(KeygenError::Config(format!(
                "file_prefix {:?} must not contain path separators",
                self.file_prefix
            )));
        }
        Ok(())
    }

    /// Worker count to use, resolving 0 to the host's available parallelism
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Compile the candidate filter, failing on a malformed vanity pattern
    pub fn compile_filter(&self) -> Result<CandidateFilter> {
        CandidateFilter::new(self.vanity.as_deref())
    }
}

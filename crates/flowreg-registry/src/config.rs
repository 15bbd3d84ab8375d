//! Registry configuration.
//!
//! Loaded from environment variables:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `FLOWREG_PERSISTENCE_PROVIDER` | `filesystem` | `filesystem` or `memory` |
//! | `FLOWREG_STORAGE_DIR` | `./flow_storage` | Root of the filesystem provider |
//! | `FLOWREG_VALIDATE_STORAGE` | `true` | Round-trip check of the provider at startup |

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use flowreg_core::defaults::FILESYSTEM_STORAGE_DIR;
use flowreg_core::{Error, Result};

pub const ENV_PERSISTENCE_PROVIDER: &str = "FLOWREG_PERSISTENCE_PROVIDER";
pub const ENV_STORAGE_DIR: &str = "FLOWREG_STORAGE_DIR";
pub const ENV_VALIDATE_STORAGE: &str = "FLOWREG_VALIDATE_STORAGE";

/// Where serialized content is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    #[default]
    Filesystem,
    Memory,
}

impl FromStr for PersistenceBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "filesystem" | "file" => Ok(Self::Filesystem),
            "memory" => Ok(Self::Memory),
            _ => Err(Error::Config(format!(
                "unknown persistence provider '{}', expected 'filesystem' or 'memory'",
                s
            ))),
        }
    }
}

impl fmt::Display for PersistenceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Settings needed to assemble a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub persistence: PersistenceBackend,
    pub storage_dir: PathBuf,
    pub validate_storage: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceBackend::default(),
            storage_dir: PathBuf::from(FILESYSTEM_STORAGE_DIR),
            validate_storage: true,
        }
    }
}

impl RegistryConfig {
    /// In-memory configuration, used by tests and throwaway instances.
    pub fn in_memory() -> Self {
        Self {
            persistence: PersistenceBackend::Memory,
            validate_storage: false,
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset variables fall back to defaults; set but malformed values are
    /// rejected rather than ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let persistence = match lookup(ENV_PERSISTENCE_PROVIDER) {
            Some(value) => value.parse()?,
            None => defaults.persistence,
        };
        let storage_dir = lookup(ENV_STORAGE_DIR)
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);
        let validate_storage = match lookup(ENV_VALIDATE_STORAGE) {
            Some(value) => parse_bool(ENV_VALIDATE_STORAGE, &value)?,
            None => defaults.validate_storage,
        };

        let config = Self {
            persistence,
            storage_dir,
            validate_storage,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.persistence == PersistenceBackend::Filesystem
            && self.storage_dir.as_os_str().is_empty()
        {
            return Err(Error::Config(format!(
                "{} cannot be empty when the filesystem provider is selected",
                ENV_STORAGE_DIR
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

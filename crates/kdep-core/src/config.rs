use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use kdep_util::errors::KdepError;

/// User configuration loaded from `~/.kdep/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KdepConfig {
    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// How project metadata is interpreted before solving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    /// Local sub-projects are composed into the root before solving.
    #[default]
    Standard,
    /// The root project is solved exactly as declared, with no local
    /// sub-project composition.
    LegacyPassthrough,
}

/// Solver settings from `[resolve]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default)]
    pub mode: ResolutionMode,
    #[serde(default = "default_prefer_lock", rename = "prefer-lock")]
    pub prefer_lock: bool,
    #[serde(default = "default_parallel_checks", rename = "parallel-checks")]
    pub parallel_checks: u32,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::default(),
            prefer_lock: default_prefer_lock(),
            parallel_checks: default_parallel_checks(),
        }
    }
}

fn default_prefer_lock() -> bool {
    true
}

fn default_parallel_checks() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

/// Log settings from `[log]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "warn".to_string()
}

impl KdepConfig {
    /// Load the configuration from `~/.kdep/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Self::from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and parse a configuration file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KdepError::Input {
            message: format!("Failed to read config {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| {
            KdepError::Input {
                message: format!("Failed to parse config {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the kdep data directory (`~/.kdep/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".kdep")
}

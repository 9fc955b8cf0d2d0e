//! Runtime configuration for the BLIMS core.
//!
//! # Responsibility
//! - Describe tunables for code generation, traversal and logging.
//! - Load them from a JSON file, falling back to defaults when absent.
//!
//! # Invariants
//! - A missing config file is not an error; defaults apply.
//! - A present but unreadable or malformed file is reported, never ignored.

use crate::model::human_code::DEFAULT_HUMAN_CODE_PREFIX;
use crate::repo::sample_repo::TraversalMode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file path.
pub const CONFIG_ENV_VAR: &str = "BLIMS_CONFIG";
/// Path used when `BLIMS_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/blims.json";
/// Default bound for container hierarchy and cycle walks.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 64;
/// Largest accepted `human_code_floor`.
pub const MAX_HUMAN_CODE_FLOOR: u64 = i64::MAX as u64;

/// Core configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimsConfig {
    /// Prefix of generated human codes (`s` yields `s1`, `s2`, ...).
    pub human_code_prefix: String,
    /// Generated codes start right after this number.
    pub human_code_floor: u64,
    /// Multiplicity policy for ancestry/descendant queries.
    pub lineage_traversal: TraversalMode,
    /// Maximum nesting depth accepted by hierarchy and cycle walks.
    pub max_hierarchy_depth: usize,
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for LimsConfig {
    fn default() -> Self {
        Self {
            human_code_prefix: DEFAULT_HUMAN_CODE_PREFIX.to_string(),
            human_code_floor: 0,
            lineage_traversal: TraversalMode::PerPath,
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

/// Config loading failures.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl LimsConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Canonical name of `log_level`; `warning` is accepted for `warn`.
    pub fn log_level_name(&self) -> Result<&'static str, ConfigError> {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" => Ok("error"),
            other => Err(ConfigError::Invalid(format!(
                "unsupported log_level `{other}`; expected trace|debug|info|warn|error"
            ))),
        }
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.human_code_prefix.as_str();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(format!(
                "human_code_prefix must be non-empty ASCII letters, got `{prefix}`"
            )));
        }
        if self.human_code_floor > MAX_HUMAN_CODE_FLOOR {
            return Err(ConfigError::Invalid(format!(
                "human_code_floor must be at most {MAX_HUMAN_CODE_FLOOR}, got {}",
                self.human_code_floor
            )));
        }
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_hierarchy_depth must be at least 1".to_string(),
            ));
        }
        self.log_level_name()?;
        if let Some(log_dir) = &self.log_dir {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }
}

// Debug builds log at `debug`, release builds at `info`.
fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Loads config from `path`, or defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<LimsConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(
            "event=config_load module=config status=default path={}",
            path.display()
        );
        return Ok(LimsConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = LimsConfig::from_json_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    info!(
        "event=config_load module=config status=ok path={}",
        path.display()
    );
    Ok(config)
}

/// Loads config from `$BLIMS_CONFIG`, or `config/blims.json` when unset.
pub fn load_config_from_env() -> Result<LimsConfig, ConfigError> {
    let path = std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::{load_config, ConfigError, LimsConfig};
    use crate::repo::sample_repo::TraversalMode;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, LimsConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blims.json");
        std::fs::write(
            &path,
            r#"{"human_code_prefix": "lab", "lineage_traversal": "distinct"}"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.human_code_prefix, "lab");
        assert_eq!(config.lineage_traversal, TraversalMode::Distinct);
        assert_eq!(config.human_code_floor, 0);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blims.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_code_floor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blims.json");
        std::fs::write(&path, r#"{"human_code_floor": 18446744073709551615}"#).unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("human_code_floor")));

        let config = LimsConfig {
            human_code_floor: super::MAX_HUMAN_CODE_FLOOR,
            ..LimsConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn log_settings_are_checked_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blims.json");

        std::fs::write(&path, r#"{"log_level": " Warning "}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.log_level_name().unwrap(), "warn");

        std::fs::write(&path, r#"{"log_level": "verbose"}"#).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, r#"{"log_dir": "logs/dev"}"#).unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn validate_rejects_bad_prefix_and_depth() {
        let config = LimsConfig {
            human_code_prefix: "s-".to_string(),
            ..LimsConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LimsConfig {
            max_hierarchy_depth: 0,
            ..LimsConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

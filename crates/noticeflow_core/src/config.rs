//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const MAX_DASHBOARD_RECENT_LIMIT: u32 = 50;

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Age after fan-out at which an unseen row of a notice without expiry
    /// counts as a failed delivery.
    #[serde(default = "default_failed_delivery_window_hours")]
    pub failed_delivery_window_hours: u32,

    /// Size of the `recent` list on department dashboards (1..=50).
    #[serde(default = "default_dashboard_recent_limit")]
    pub dashboard_recent_limit: u32,

    /// Attempts per atomic write before surfacing a concurrency conflict.
    #[serde(default = "default_conflict_retry_limit")]
    pub conflict_retry_limit: u32,

    /// Run the expiry sweeper before list reads.
    #[serde(default = "default_true")]
    pub sweep_on_read: bool,

    /// Period of `noticeflow sweep --watch`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[logging]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Falls back to the build-mode default when unset.
    #[serde(default)]
    pub level: Option<String>,
    /// Absolute directory for rolling log files. No file logging when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failed_delivery_window_hours: default_failed_delivery_window_hours(),
            dashboard_recent_limit: default_dashboard_recent_limit(),
            conflict_retry_limit: default_conflict_retry_limit(),
            sweep_on_read: true,
            sweep_interval_secs: default_sweep_interval_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_failed_delivery_window_hours() -> u32 {
    48
}
fn default_dashboard_recent_limit() -> u32 {
    10
}
fn default_conflict_retry_limit() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_sweep_interval_secs() -> u64 {
    300
}

/// Configuration load failure.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    /// Parsed but semantically unusable.
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config TOML: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl EngineConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses TOML text, then clamps and checks ranges.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validated()
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.dashboard_recent_limit = self
            .dashboard_recent_limit
            .clamp(1, MAX_DASHBOARD_RECENT_LIMIT);
        self.conflict_retry_limit = self.conflict_retry_limit.max(1);
        if self.failed_delivery_window_hours == 0 {
            return Err(ConfigError::Invalid {
                field: "failed_delivery_window_hours",
                message: "must be at least 1".to_string(),
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(dir) = self.logging.dir.as_deref() {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.dir",
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.failed_delivery_window_hours, 48);
        assert_eq!(config.dashboard_recent_limit, 10);
        assert_eq!(config.conflict_retry_limit, 3);
        assert!(config.sweep_on_read);
    }

    #[test]
    fn overrides_are_parsed_and_clamped() {
        let config = EngineConfig::from_toml_str(
            r#"
failed_delivery_window_hours = 72
dashboard_recent_limit = 500
conflict_retry_limit = 0
sweep_on_read = false

[logging]
level = "warn"
"#,
        )
        .unwrap();
        assert_eq!(config.failed_delivery_window_hours, 72);
        assert_eq!(config.dashboard_recent_limit, 50);
        assert_eq!(config.conflict_retry_limit, 1);
        assert!(!config.sweep_on_read);
        assert_eq!(config.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn relative_log_dir_is_rejected() {
        let err = EngineConfig::from_toml_str("[logging]\ndir = \"logs\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "logging.dir",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("dashboard_recent_limit = \"ten\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(
            EngineConfig::load_or_default(&missing).unwrap(),
            EngineConfig::default()
        );
    }
}

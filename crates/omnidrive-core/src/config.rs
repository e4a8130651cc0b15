//! Configuration module for OmniDrive.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//!
//! ```yaml
//! backends:
//!   drive-a:
//!     kind: local
//!     root: /srv/drive-a
//!   drive-b:
//!     kind: local
//!     root: /srv/drive-b
//!     quota_bytes: 10737418240
//! sync:
//!   max_workers: 4
//!   max_attempts: 3
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for OmniDrive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named storage backends, keyed by backend name.
    pub backends: BTreeMap<String, BackendConfig>,
    pub sync: SyncConfig,
    pub session_store: SessionStoreConfig,
    pub logging: LoggingConfig,
}

/// One storage backend definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Adapter kind: `local` or `memory`.
    pub kind: String,
    /// Root directory for `local` backends.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Capacity to report to capacity checks (unknown when absent).
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    /// Entries per listing page.
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Comparison and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent transfer units.
    pub max_workers: usize,
    /// Attempts per transfer unit, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    pub backoff_max_ms: u64,
    /// Deadline for a single adapter call, in seconds.
    pub call_timeout_secs: u64,
    /// Records listed per backend when the caller gives no limit.
    pub default_limit: usize,
    /// Record matching key: `name_and_size` or `name_only`.
    pub key_policy: String,
    /// Keep soft-deleted records in catalogs.
    pub include_trashed: bool,
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoreConfig {
    /// Path of the SQLite database file.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/omnidrive/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("omnidrive")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            call_timeout_secs: 60,
            default_limit: 100,
            key_policy: "name_and_size".to_string(),
            include_trashed: false,
        }
    }
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("omnidrive")
                .join("omnidrive.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Valid values for `sync.key_policy`.
const VALID_KEY_POLICIES: &[&str] = &["name_and_size", "name_only"];

/// Valid values for `backends.<name>.kind`.
pub const VALID_BACKEND_KINDS: &[&str] = &["local", "memory"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- backends ---
        for (name, backend) in &self.backends {
            let prefix = format!("backends.{name}");
            if let Err(e) = crate::domain::BackendName::new(name.as_str()) {
                errors.push(ValidationError {
                    field: prefix.clone(),
                    message: e.to_string(),
                });
            }
            if !VALID_BACKEND_KINDS.contains(&backend.kind.as_str()) {
                errors.push(ValidationError {
                    field: format!("{prefix}.kind"),
                    message: format!(
                        "invalid kind '{}', expected one of: {}",
                        backend.kind,
                        VALID_BACKEND_KINDS.join(", ")
                    ),
                });
            }
            if backend.kind == "local" && backend.root.is_none() {
                errors.push(ValidationError {
                    field: format!("{prefix}.root"),
                    message: "is required for local backends".into(),
                });
            }
            if backend.page_size == Some(0) {
                errors.push(ValidationError {
                    field: format!("{prefix}.page_size"),
                    message: "must be greater than 0".into(),
                });
            }
        }

        // --- sync ---
        if self.sync.max_workers == 0 {
            errors.push(ValidationError {
                field: "sync.max_workers".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.max_attempts == 0 {
            errors.push(ValidationError {
                field: "sync.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.call_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync.call_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.default_limit == 0 {
            errors.push(ValidationError {
                field: "sync.default_limit".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.backoff_max_ms < self.sync.backoff_base_ms {
            errors.push(ValidationError {
                field: "sync.backoff_max_ms".into(),
                message: "must be greater than or equal to sync.backoff_base_ms".into(),
            });
        }
        if !VALID_KEY_POLICIES.contains(&self.sync.key_policy.as_str()) {
            errors.push(ValidationError {
                field: "sync.key_policy".into(),
                message: format!(
                    "invalid policy '{}', expected one of: {}",
                    self.sync.key_policy,
                    VALID_KEY_POLICIES.join(", ")
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}', expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use omnidrive_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .local_backend("drive-a", PathBuf::from("/srv/a"))
///     .local_backend("drive-b", PathBuf::from("/srv/b"))
///     .sync_max_workers(8)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backends ---

    pub fn backend(mut self, name: impl Into<String>, backend: BackendConfig) -> Self {
        self.config.backends.insert(name.into(), backend);
        self
    }

    pub fn local_backend(self, name: impl Into<String>, root: PathBuf) -> Self {
        self.backend(
            name,
            BackendConfig {
                kind: "local".to_string(),
                root: Some(root),
                quota_bytes: None,
                page_size: None,
            },
        )
    }

    pub fn memory_backend(self, name: impl Into<String>) -> Self {
        self.backend(
            name,
            BackendConfig {
                kind: "memory".to_string(),
                root: None,
                quota_bytes: None,
                page_size: None,
            },
        )
    }

    // --- sync ---

    pub fn sync_max_workers(mut self, n: usize) -> Self {
        self.config.sync.max_workers = n;
        self
    }

    pub fn sync_max_attempts(mut self, n: u32) -> Self {
        self.config.sync.max_attempts = n;
        self
    }

    pub fn sync_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.config.sync.backoff_base_ms = base_ms;
        self.config.sync.backoff_max_ms = max_ms;
        self
    }

    pub fn sync_call_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.call_timeout_secs = seconds;
        self
    }

    pub fn sync_default_limit(mut self, limit: usize) -> Self {
        self.config.sync.default_limit = limit;
        self
    }

    pub fn sync_key_policy(mut self, policy: &str) -> Self {
        self.config.sync.key_policy = policy.to_string();
        self
    }

    pub fn sync_include_trashed(mut self, include: bool) -> Self {
        self.config.sync.include_trashed = include;
        self
    }

    // --- session_store ---

    pub fn session_database(mut self, path: PathBuf) -> Self {
        self.config.session_store.database = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn logging_format(mut self, format: &str) -> Self {
        self.config.logging.format = format.to_string();
        self
    }

    /// Consume the builder and return the final [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate; returns `Err` with all validation errors if invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Configuration module for cloudmirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;
use crate::domain::mapping::{ExclusionSet, Mapping};
use crate::domain::newtypes::{LogicalPath, RemoteId};
use crate::domain::policy::{ChangeDetection, MappingErrorPolicy};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for cloudmirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Credential material handed to the authenticator.
    pub credentials_file: PathBuf,
    /// Id of the remote folder every logical path is resolved from.
    pub root_folder_id: String,
    /// Local root -> logical remote parent location.
    pub paths: BTreeMap<PathBuf, String>,
    /// Local paths never mirrored (each must lie under a configured root).
    pub exclude: Vec<PathBuf>,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// `always` or `size_and_modified`.
    pub change_detection: ChangeDetection,
    /// `fail_fast` or `continue`.
    pub on_mapping_error: MappingErrorPolicy,
}

/// Retry settings for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt.
    pub base_delay_ms: u64,
}

/// Remote store transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Children requested per listing page.
    pub page_size: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloudmirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudmirror")
    }

    /// The configured mappings as domain values.
    ///
    /// Fails only if a remote path does not parse, which `validate` reports.
    pub fn mappings(&self) -> Result<Vec<Mapping>, DomainError> {
        self.paths
            .iter()
            .map(|(local, remote)| Ok(Mapping::new(local.clone(), LogicalPath::parse(remote)?)))
            .collect()
    }

    /// The configured exclusions as a domain value.
    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(self.exclude.iter().cloned())
    }

    /// The configured root folder id.
    pub fn root_id(&self) -> Result<RemoteId, DomainError> {
        RemoteId::new(self.root_folder_id.clone())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_file: Self::config_dir().join("credentials.json"),
            // Drive accepts `root` as an alias for the user's top-level folder.
            root_folder_id: "root".to_string(),
            paths: BTreeMap::new(),
            exclude: Vec::new(),
            sync: SyncConfig::default(),
            retry: RetryConfig::default(),
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            page_size: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.page_size"`.
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
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Upper bound for `retry.max_retries`.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound for `remote.page_size` (Drive rejects larger pages).
const MAX_PAGE_SIZE: u32 = 1000;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Filesystem checks
    /// (credentials file, local roots) run here so that no remote call is
    /// made with a configuration that cannot succeed.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- credentials / root ---
        if !self.credentials_file.is_file() {
            errors.push(ValidationError {
                field: "credentials_file".into(),
                message: format!("file does not exist: {}", self.credentials_file.display()),
            });
        }
        if self.root_folder_id.is_empty() {
            errors.push(ValidationError {
                field: "root_folder_id".into(),
                message: "must not be empty".into(),
            });
        } else if let Err(e) = RemoteId::new(self.root_folder_id.clone()) {
            errors.push(ValidationError {
                field: "root_folder_id".into(),
                message: e.to_string(),
            });
        }

        // --- paths ---
        if self.paths.is_empty() {
            errors.push(ValidationError {
                field: "paths".into(),
                message: "at least one path must be configured".into(),
            });
        }
        for (local, remote) in &self.paths {
            let field = format!("paths.{}", local.display());
            if !local.exists() {
                errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("local path does not exist: {}", local.display()),
                });
            } else if local.file_name().is_none() {
                errors.push(ValidationError {
                    field: field.clone(),
                    message: "local path must name a file or directory".into(),
                });
            }
            if let Err(e) = LogicalPath::parse(remote) {
                errors.push(ValidationError {
                    field,
                    message: e.to_string(),
                });
            }
        }

        // --- exclude ---
        for (i, excluded) in self.exclude.iter().enumerate() {
            let covered = self.paths.keys().any(|root| excluded.starts_with(root));
            if !covered {
                errors.push(ValidationError {
                    field: format!("exclude[{i}]"),
                    message: format!(
                        "{} is not under any configured path",
                        excluded.display()
                    ),
                });
            }
        }

        // --- retry ---
        if self.retry.max_retries > MAX_RETRIES_LIMIT {
            errors.push(ValidationError {
                field: "retry.max_retries".into(),
                message: format!("must be at most {MAX_RETRIES_LIMIT}"),
            });
        }

        // --- remote ---
        if self.remote.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote.page_size == 0 || self.remote.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError {
                field: "remote.page_size".into(),
                message: format!("must be between 1 and {MAX_PAGE_SIZE}"),
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
/// use cloudmirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .credentials_file("/etc/cloudmirror/credentials.json")
///     .root_folder_id("1AbCdEf")
///     .path("/home/me/notes", "backups/laptop")
///     .logging_level("debug")
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

    pub fn credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_file = path.into();
        self
    }

    pub fn root_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.root_folder_id = id.into();
        self
    }

    // --- paths ---

    pub fn path(mut self, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        self.config.paths.insert(local.into(), remote.into());
        self
    }

    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.exclude.push(path.into());
        self
    }

    // --- sync ---

    pub fn change_detection(mut self, mode: ChangeDetection) -> Self {
        self.config.sync.change_detection = mode;
        self
    }

    pub fn on_mapping_error(mut self, policy: MappingErrorPolicy) -> Self {
        self.config.sync.on_mapping_error = policy;
        self
    }

    // --- retry ---

    pub fn retry_max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    // --- remote ---

    pub fn remote_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.request_timeout_secs = secs;
        self
    }

    pub fn remote_page_size(mut self, n: u32) -> Self {
        self.config.remote.page_size = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
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

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

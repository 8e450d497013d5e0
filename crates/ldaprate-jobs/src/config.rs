//! Configuration management for ldaprate jobs.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Environment variables (highest priority)
//! 2. TOML configuration file
//! 3. Default values (lowest priority)

use crate::client::SearchScope;
use crate::job::JobKind;
use crate::jobs::ModificationTemplate;
use crate::runner::RunSettings;
use crate::value::ValuePattern;
use ldaprate_core::{parse_duration, parse_optional_duration, WindowConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// File read by [`Config::load`] when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ldaprate.toml";

/// Main configuration structure for an ldaprate run.
///
/// Can be loaded from TOML file or constructed with defaults.
/// Environment variables override TOML settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Job selection, threading, pacing and statistics window
    #[serde(default)]
    pub job: JobConfig,

    /// Search settings, also used by the combined jobs
    #[serde(default)]
    pub search: SearchConfig,

    /// Bind settings, also used by search-and-bind
    #[serde(default)]
    pub bind: BindConfig,

    /// Modify settings, also used by search-and-modify
    #[serde(default)]
    pub modify: ModifyConfig,

    /// In-memory directory the CLI runs against
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings every job shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job type (default: "search")
    #[serde(default)]
    pub kind: JobKind,

    /// Worker threads (default: 1)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// How long the job runs, e.g. "5m"; unlimited when absent
    #[serde(default)]
    pub duration: Option<String>,

    /// Statistics collection interval in seconds (default: 60)
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u32,

    /// Time at the start during which statistics are not collected
    #[serde(default)]
    pub warm_up: Option<String>,

    /// Time at the end during which statistics are not collected
    #[serde(default)]
    pub cool_down: Option<String>,

    /// Maximum iterations per rate interval across all threads
    #[serde(default)]
    pub max_rate: Option<u32>,

    /// Interval the max rate applies to (default: "1s")
    #[serde(default = "default_rate_interval")]
    pub rate_interval: String,

    /// Reconnect after this many iterations, 0 disables (default: 0)
    #[serde(default)]
    pub operations_between_reconnects: u64,

    /// Parent RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,

    /// Client identifier stamped on every tracker (default: "ldaprate")
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search base pattern (default: "dc=example,dc=com")
    #[serde(default = "default_base_dn")]
    pub base_dn: String,

    /// Search scope: base, one or sub (default: "sub")
    #[serde(default)]
    pub scope: SearchScope,

    /// First filter pattern
    #[serde(default = "default_filter")]
    pub filter1: String,

    /// Second filter pattern, required when `filter1_percent` is below 100
    #[serde(default)]
    pub filter2: Option<String>,

    /// Percentage of searches that use the first filter (default: 100)
    #[serde(default = "default_first_percent")]
    pub filter1_percent: u8,

    /// Attributes to return; empty returns all
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Maximum entries per search, 0 for no limit (default: 0)
    #[serde(default)]
    pub size_limit: u32,

    /// Server-side time limit in seconds, 0 for no limit (default: 0)
    #[serde(default)]
    pub time_limit_secs: u32,
}

/// Bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Bind DN pattern for the bind job
    #[serde(default = "default_entry_dn")]
    pub dn: String,

    /// Second bind DN pattern, required when `dn1_percent` is below 100
    #[serde(default)]
    pub dn2: Option<String>,

    /// Percentage of binds that use the first DN pattern (default: 100)
    #[serde(default = "default_first_percent")]
    pub dn1_percent: u8,

    /// Static bind password
    #[serde(default)]
    pub password: Option<String>,

    /// Attribute of the found entry holding its clear-text password
    /// (search-and-bind only)
    #[serde(default)]
    pub password_attribute: Option<String>,
}

/// Modify settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyConfig {
    /// Entry DN pattern for the modify job
    #[serde(default = "default_entry_dn")]
    pub dn: String,

    /// Attributes to replace: `attr` or `attr:count:pattern`
    #[serde(default = "default_modify_attributes")]
    pub attributes: Vec<String>,

    /// Length of generated values for bare attribute names (default: 80)
    #[serde(default = "default_value_length")]
    pub value_length: usize,

    /// Characters generated values are drawn from
    #[serde(default = "default_character_set")]
    pub character_set: String,
}

/// In-memory directory seeded by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Suffix entries are created under (default: "dc=example,dc=com")
    #[serde(default = "default_base_dn")]
    pub base_dn: String,

    /// Number of `uid=user.N` entries to create (default: 1000)
    #[serde(default = "default_users")]
    pub users: u32,

    /// `userPassword` of every seeded entry (default: "password")
    #[serde(default = "default_user_password")]
    pub user_password: String,

    /// Simulated latency added to every operation, in milliseconds
    /// (default: 0)
    #[serde(default)]
    pub latency_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_threads() -> usize {
    1
}

fn default_collection_interval() -> u32 {
    60
}

fn default_rate_interval() -> String {
    "1s".to_string()
}

fn default_client_id() -> String {
    "ldaprate".to_string()
}

fn default_base_dn() -> String {
    "dc=example,dc=com".to_string()
}

fn default_filter() -> String {
    "(uid=user.[1-1000])".to_string()
}

fn default_first_percent() -> u8 {
    100
}

fn default_entry_dn() -> String {
    "uid=user.[1-1000],ou=People,dc=example,dc=com".to_string()
}

fn default_modify_attributes() -> Vec<String> {
    vec!["description".to_string()]
}

fn default_value_length() -> usize {
    80
}

fn default_character_set() -> String {
    "abcdefghijklmnopqrstuvwxyz".to_string()
}

fn default_users() -> u32 {
    1000
}

fn default_user_password() -> String {
    "password".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            kind: JobKind::default(),
            threads: default_threads(),
            duration: None,
            collection_interval_secs: default_collection_interval(),
            warm_up: None,
            cool_down: None,
            max_rate: None,
            rate_interval: default_rate_interval(),
            operations_between_reconnects: 0,
            seed: None,
            client_id: default_client_id(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_dn: default_base_dn(),
            scope: SearchScope::default(),
            filter1: default_filter(),
            filter2: None,
            filter1_percent: default_first_percent(),
            attributes: Vec::new(),
            size_limit: 0,
            time_limit_secs: 0,
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            dn: default_entry_dn(),
            dn2: None,
            dn1_percent: default_first_percent(),
            password: None,
            password_attribute: None,
        }
    }
}

impl Default for ModifyConfig {
    fn default() -> Self {
        Self {
            dn: default_entry_dn(),
            attributes: default_modify_attributes(),
            value_length: default_value_length(),
            character_set: default_character_set(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_dn: default_base_dn(),
            users: default_users(),
            user_password: default_user_password(),
            latency_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file doesn't exist or has invalid TOML syntax.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError { path, source: e })
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Reads `path` when given, otherwise [`DEFAULT_CONFIG_FILE`] if it
    /// exists, otherwise uses defaults.
    ///
    /// Supported environment variables:
    /// - `LDAPRATE_JOB_KIND` - Job type
    /// - `LDAPRATE_THREADS` - Worker threads
    /// - `LDAPRATE_DURATION` - Job duration
    /// - `LDAPRATE_MAX_RATE` - Maximum iterations per rate interval
    /// - `LDAPRATE_SEED` - Parent RNG seed
    /// - `LDAPRATE_LOG_LEVEL` - Log level
    /// - `LDAPRATE_LOG_FORMAT` - Log format
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(kind) = std::env::var("LDAPRATE_JOB_KIND") {
            if let Ok(kind) = kind.parse() {
                self.job.kind = kind;
            }
        }

        if let Ok(threads) = std::env::var("LDAPRATE_THREADS") {
            if let Ok(threads) = threads.parse() {
                self.job.threads = threads;
            }
        }

        if let Ok(duration) = std::env::var("LDAPRATE_DURATION") {
            self.job.duration = Some(duration);
        }

        if let Ok(rate) = std::env::var("LDAPRATE_MAX_RATE") {
            if let Ok(rate) = rate.parse() {
                self.job.max_rate = Some(rate);
            }
        }

        if let Ok(seed) = std::env::var("LDAPRATE_SEED") {
            if let Ok(seed) = seed.parse() {
                self.job.seed = Some(seed);
            }
        }

        if let Ok(level) = std::env::var("LDAPRATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("LDAPRATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    ///
    /// A warm-up plus cool-down that covers the whole duration is only
    /// warned about; such a run collects nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = self.run_settings()?;

        if self.job.threads == 0 {
            return Err(invalid("job.threads must be > 0"));
        }

        if self.job.collection_interval_secs == 0 {
            return Err(invalid("job.collection_interval_secs must be > 0"));
        }

        if self.job.max_rate == Some(0) {
            return Err(invalid("job.max_rate must be > 0 when set"));
        }

        if settings.max_rate.is_some() && settings.rate_interval.is_zero() {
            return Err(invalid("job.rate_interval must be > 0"));
        }

        if settings.window.cool_down.is_some_and(|c| !c.is_zero()) && settings.duration.is_none()
        {
            return Err(invalid("job.cool_down requires job.duration"));
        }

        if let Some(duration) = settings.duration {
            let window = settings.window.warm_up.unwrap_or_default()
                + settings.window.cool_down.unwrap_or_default();
            if !window.is_zero() && window >= duration {
                warn!(
                    ?duration,
                    warm_up = ?settings.window.warm_up,
                    cool_down = ?settings.window.cool_down,
                    "warm-up and cool-down cover the whole run; no statistics will be collected"
                );
            }
        }

        match self.job.kind {
            JobKind::Bind => {
                check_pattern("bind.dn", &self.bind.dn)?;
                if self.bind.dn1_percent > 100 {
                    return Err(invalid("bind.dn1_percent must be between 0 and 100"));
                }
                match &self.bind.dn2 {
                    Some(dn) => check_pattern("bind.dn2", dn)?,
                    None if self.bind.dn1_percent < 100 => {
                        return Err(invalid(
                            "bind.dn2 is required when bind.dn1_percent is below 100",
                        ))
                    }
                    None => {}
                }
                if self.bind.password.is_none() {
                    return Err(invalid("bind.password is required for the bind job"));
                }
            }
            JobKind::Search => self.validate_search()?,
            JobKind::Modify => {
                check_pattern("modify.dn", &self.modify.dn)?;
                self.validate_modifications()?;
            }
            JobKind::SearchAndBind => {
                self.validate_search()?;
                match (&self.bind.password, &self.bind.password_attribute) {
                    (Some(_), Some(_)) => {
                        return Err(invalid(
                            "bind.password and bind.password_attribute are mutually exclusive",
                        ))
                    }
                    (None, None) => {
                        return Err(invalid(
                            "search-and-bind requires bind.password or bind.password_attribute",
                        ))
                    }
                    (None, Some(attribute)) if attribute.trim().is_empty() => {
                        return Err(invalid("bind.password_attribute cannot be empty"))
                    }
                    _ => {}
                }
            }
            JobKind::SearchAndModify => {
                self.validate_search()?;
                self.validate_modifications()?;
            }
        }

        if self.directory.base_dn.trim().is_empty() {
            return Err(invalid("directory.base_dn cannot be empty"));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        // Validate log format
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        check_pattern("search.base_dn", &self.search.base_dn)?;
        check_pattern("search.filter1", &self.search.filter1)?;
        if self.search.filter1_percent > 100 {
            return Err(invalid("search.filter1_percent must be between 0 and 100"));
        }
        match &self.search.filter2 {
            Some(filter) => check_pattern("search.filter2", filter)?,
            None if self.search.filter1_percent < 100 => {
                return Err(invalid(
                    "search.filter2 is required when search.filter1_percent is below 100",
                ))
            }
            None => {}
        }
        Ok(())
    }

    fn validate_modifications(&self) -> Result<(), ConfigError> {
        if self.modify.attributes.is_empty() {
            return Err(invalid("modify.attributes must name at least one attribute"));
        }
        for attribute in &self.modify.attributes {
            attribute
                .parse::<ModificationTemplate>()
                .map_err(|e| invalid(format!("modify.attributes: {e}")))?;
        }
        if self.modify.value_length == 0 {
            return Err(invalid("modify.value_length must be > 0"));
        }
        if self.modify.character_set.is_empty() {
            return Err(invalid("modify.character_set cannot be empty"));
        }
        Ok(())
    }

    /// Typed settings for the job runner.
    ///
    /// Returns an error when a duration setting does not parse.
    pub fn run_settings(&self) -> Result<RunSettings, ConfigError> {
        let duration = |key: &str, value: Option<&str>| {
            parse_optional_duration(value).map_err(|e| invalid(format!("{key}: {e}")))
        };

        let rate_interval: Duration = parse_duration(&self.job.rate_interval)
            .map_err(|e| invalid(format!("job.rate_interval: {e}")))?;

        Ok(RunSettings {
            threads: self.job.threads,
            duration: duration("job.duration", self.job.duration.as_deref())?,
            collection_interval_secs: self.job.collection_interval_secs,
            window: WindowConfig {
                warm_up: duration("job.warm_up", self.job.warm_up.as_deref())?,
                cool_down: duration("job.cool_down", self.job.cool_down.as_deref())?,
            },
            max_rate: self.job.max_rate,
            rate_interval,
            operations_between_reconnects: self.job.operations_between_reconnects,
            seed: self.job.seed,
            client_id: self.job.client_id.clone(),
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_pattern(key: &str, pattern: &str) -> Result<(), ConfigError> {
    if pattern.trim().is_empty() {
        return Err(invalid(format!("{key} cannot be empty")));
    }
    pattern
        .parse::<ValuePattern>()
        .map(|_| ())
        .map_err(|e| invalid(format!("{key}: {e}")))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file
    #[error("Failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

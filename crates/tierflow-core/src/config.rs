//! Layered configuration for Tierflow.
//!
//! Sources in priority order (highest wins):
//! 1. Environment variables (`TIERFLOW_*` prefix, `__` separates sections)
//! 2. A TOML file (explicit path, `$TIERFLOW_CONFIG`, or `~/.config/tierflow/config.toml`)
//! 3. Built-in defaults
//!
//! `TIERFLOW_FABRIC__BASE_URL` maps to `fabric.base_url`,
//! `TIERFLOW_MONITOR__POLL_INTERVAL_MS` to `monitor.poll_interval_ms`, and so on.
//!
//! The resulting [`TierflowConfig`] is built once at startup and handed to
//! each component by section.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::error::TierflowError;

/// Environment variable prefix for all settings.
pub const ENV_PREFIX: &str = "TIERFLOW_";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TIERFLOW_CONFIG";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A required configuration section is not configured.
    #[error("Configuration section '{section}' is not configured (missing required fields)")]
    NotConfigured { section: String },

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

impl From<ConfigError> for TierflowError {
    fn from(err: ConfigError) -> Self {
        TierflowError::Config {
            message: err.to_string(),
        }
    }
}

/// Connection settings for the remote storage fabric.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Management API base URL, e.g. `https://fabric.example:8443/mgmt/v1.2/rest/`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Verify the fabric's TLS certificate.
    pub verify_tls: bool,
    pub request_timeout_secs: u64,
    /// Upper bound on in-flight requests against the fabric.
    pub max_concurrent_requests: usize,
    /// Extra attempts for idempotent reads on transient failures.
    pub read_retries: u32,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            verify_tls: true,
            request_timeout_secs: 30,
            max_concurrent_requests: 2,
            read_retries: 2,
        }
    }
}

impl FabricConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether credentials and a base URL are present.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

/// A watched share: where it is mounted locally and where it lives on the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShareMapping {
    pub local_root: PathBuf,
    pub fabric_root: String,
}

impl ShareMapping {
    pub fn new(local_root: impl Into<PathBuf>, fabric_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            fabric_root: fabric_root.into(),
        }
    }

    /// Translate a local path under this share into its fabric path.
    ///
    /// Returns `None` when the path is outside the share's local root.
    pub fn fabric_path_for(&self, local: &Path) -> Option<String> {
        let relative = local.strip_prefix(&self.local_root).ok()?;
        let mut fabric = self.fabric_root.trim_end_matches('/').to_string();
        for component in relative.components() {
            fabric.push('/');
            fabric.push_str(&component.as_os_str().to_string_lossy());
        }
        if fabric.is_empty() {
            fabric.push('/');
        }
        Some(fabric)
    }
}

/// File monitor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub shares: Vec<ShareMapping>,
    pub poll_interval_ms: u64,
    /// Descend into subdirectories when scanning.
    pub recursive: bool,
    /// Use filesystem change notifications to trigger early scans.
    pub use_notifications: bool,
    /// Namespace for the computed tag keys.
    pub tag_namespace: String,
    /// Additional `namespace.key = value` tags applied to every file.
    pub extra_tags: BTreeMap<String, String>,
    /// Files modified more recently than this are treated as still being written.
    pub min_file_age_ms: u64,
    /// Capacity of each monitor's seen set.
    pub seen_capacity: usize,
    /// Optional JSON Lines log of tagging events.
    pub event_log_path: Option<PathBuf>,
    /// Number of recent tagging events kept in memory.
    pub event_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            shares: Vec::new(),
            poll_interval_ms: 2_000,
            recursive: false,
            use_notifications: true,
            tag_namespace: "user".to_string(),
            extra_tags: BTreeMap::new(),
            min_file_age_ms: 0,
            seen_capacity: 10_000,
            event_log_path: None,
            event_buffer: 1_000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_file_age(&self) -> Duration {
        Duration::from_millis(self.min_file_age_ms)
    }
}

/// Catalog store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    /// Entries older than this are reported as stale.
    pub staleness_threshold_secs: u64,
    /// Stale entries tolerated before the store reports unhealthy.
    pub max_stale_entries: u64,
    pub sync_interval_secs: u64,
    /// Enumerate files under each share during a full sync.
    pub sync_files: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("catalog.db"),
            staleness_threshold_secs: 24 * 60 * 60,
            max_stale_entries: 0,
            sync_interval_secs: 300,
            sync_files: true,
        }
    }
}

impl CatalogConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// Job tracker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobsConfig {
    pub initial_poll_ms: u64,
    /// Cap for the exponential polling backoff.
    pub max_poll_ms: u64,
    pub backoff_factor: f64,
    /// Spawn one polling task per tracked job.
    pub background_polling: bool,
    /// Finished jobs kept for listing; the oldest are forgotten first.
    pub max_finished_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            initial_poll_ms: 500,
            max_poll_ms: 30_000,
            backoff_factor: 2.0,
            background_polling: true,
            max_finished_jobs: 1_000,
        }
    }
}

impl JobsConfig {
    pub fn initial_poll(&self) -> Duration {
        Duration::from_millis(self.initial_poll_ms)
    }

    pub fn max_poll(&self) -> Duration {
        Duration::from_millis(self.max_poll_ms)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Objective submissions kept in flight at once.
    pub submit_concurrency: usize,
    /// Fall back to a live fabric search when the catalog is stale.
    pub stale_fallback: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            submit_concurrency: 4,
            stale_fallback: true,
        }
    }
}

/// Tool server settings (used by the RPC binary only).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_concurrent_requests: 64,
        }
    }
}

/// Complete Tierflow configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TierflowConfig {
    #[serde(default)]
    pub fabric: FabricConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl TierflowConfig {
    /// Load configuration from defaults, the default config file, and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration with an explicit config file path.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::InvalidValue {
                    field: "config".to_string(),
                    reason: format!("config file {} does not exist", path.display()),
                });
            }
        }
        Self::figment(path).extract().map_err(ConfigError::from)
    }

    /// Build the figment provider chain.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(Self::global_config_path);
        if let Some(file) = file {
            if file.exists() {
                figment = figment.merge(Toml::file(file));
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tierflow").join("config.toml"))
    }

    /// Validate the configuration for starting the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_fabric()?;
        self.validate_pipeline()
    }

    /// Validate the fabric connection settings.
    pub fn validate_fabric(&self) -> Result<(), ConfigError> {
        if !self.fabric.is_configured() {
            return Err(ConfigError::NotConfigured {
                section: "fabric".to_string(),
            });
        }

        let url = url::Url::parse(&self.fabric.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "fabric.base_url".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "fabric.base_url".to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        for (field, value) in [
            ("fabric.request_timeout_secs", self.fabric.request_timeout_secs),
            ("fabric.max_concurrent_requests", self.fabric.max_concurrent_requests as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate everything except the fabric section.
    ///
    /// Used when the caller supplies its own gateway.
    pub fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let positive = [
            ("monitor.poll_interval_ms", self.monitor.poll_interval_ms),
            ("monitor.seen_capacity", self.monitor.seen_capacity as u64),
            ("catalog.sync_interval_secs", self.catalog.sync_interval_secs),
            ("catalog.staleness_threshold_secs", self.catalog.staleness_threshold_secs),
            ("jobs.initial_poll_ms", self.jobs.initial_poll_ms),
            ("jobs.max_finished_jobs", self.jobs.max_finished_jobs as u64),
            ("orchestrator.submit_concurrency", self.orchestrator.submit_concurrency as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.jobs.max_poll_ms < self.jobs.initial_poll_ms {
            return Err(ConfigError::InvalidValue {
                field: "jobs.max_poll_ms".to_string(),
                reason: "must not be smaller than jobs.initial_poll_ms".to_string(),
            });
        }
        if self.jobs.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "jobs.backoff_factor".to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }

        if self.monitor.tag_namespace.trim().is_empty() || self.monitor.tag_namespace.contains('.') {
            return Err(ConfigError::InvalidValue {
                field: "monitor.tag_namespace".to_string(),
                reason: "must be a non-empty name without dots".to_string(),
            });
        }

        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tierflow")
}

//! Builder for configuring TierflowApi initialization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::cancel::CancellationToken;
use crate::catalog::{CatalogStore, CatalogSyncer};
use crate::config::TierflowConfig;
use crate::error::{Result, TierflowError};
use crate::gateway::{HttpGateway, StorageGateway};
use crate::jobs::JobTracker;
use crate::monitor::{FileMonitor, TagEventLog};
use crate::orchestrator::TagObjectiveOrchestrator;
use crate::tagging::TagEngine;
use crate::tools::ToolRegistry;
use crate::TierflowApi;

/// Builder for configuring TierflowApi initialization.
///
/// # Example
///
/// ```rust,ignore
/// use tierflow_core::{TierflowApi, TierflowConfig};
///
/// let api = TierflowApi::builder(TierflowConfig::load()?)
///     .auto_create_dirs(true)
///     .build()
///     .await?;
/// ```
pub struct TierflowApiBuilder {
    config: TierflowConfig,
    gateway: Option<Arc<dyn StorageGateway>>,
    auto_create_dirs: bool,
    restore_from: Option<PathBuf>,
}

impl TierflowApiBuilder {
    pub fn new(config: TierflowConfig) -> Self {
        Self {
            config,
            gateway: None,
            auto_create_dirs: false,
            restore_from: None,
        }
    }

    /// Use `gateway` instead of an HTTP client built from `config.fabric`.
    ///
    /// The fabric section of the configuration is then not validated.
    pub fn with_gateway(mut self, gateway: Arc<dyn StorageGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Create the catalog and event log directories if they don't exist.
    ///
    /// Default: `false` (directories must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Replace the catalog file with `backup` before opening it.
    ///
    /// The current file is never opened, so this recovers a catalog that is
    /// corrupted or not a database at all.
    pub fn restore_from(mut self, backup: impl Into<PathBuf>) -> Self {
        self.restore_from = Some(backup.into());
        self
    }

    fn ensure_parent(&self, file: &Path) -> Result<()> {
        let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };
        if parent.exists() {
            return Ok(());
        }
        if !self.auto_create_dirs {
            return Err(TierflowError::Config {
                message: format!("Directory does not exist: {}", parent.display()),
            });
        }
        std::fs::create_dir_all(parent).map_err(|e| TierflowError::Io {
            message: format!("Failed to create directory: {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;
        debug!("Created {}", parent.display());
        Ok(())
    }

    /// Build the TierflowApi instance.
    pub async fn build(self) -> Result<TierflowApi> {
        let gateway: Arc<dyn StorageGateway> = match &self.gateway {
            Some(gateway) => {
                self.config.validate_pipeline()?;
                gateway.clone()
            }
            None => {
                self.config.validate()?;
                Arc::new(HttpGateway::new(&self.config.fabric)?)
            }
        };

        self.ensure_parent(&self.config.catalog.db_path)?;
        if let Some(log_path) = &self.config.monitor.event_log_path {
            self.ensure_parent(log_path)?;
        }

        if let Some(backup) = &self.restore_from {
            let restored = CatalogStore::restore_file(&self.config.catalog.db_path, backup)?;
            info!(from = %backup.display(), entries = restored, "Restored catalog before startup");
        }

        let config = self.config;
        let store = Arc::new(CatalogStore::open(&config.catalog)?);
        let syncer = Arc::new(CatalogSyncer::new(
            gateway.clone(),
            store.clone(),
            config.catalog.sync_files,
        ));

        let engine = Arc::new(
            TagEngine::new(gateway.clone(), config.monitor.tag_namespace.clone())
                .with_extra_tags(config.monitor.extra_tags.clone()),
        );
        let events = Arc::new(match &config.monitor.event_log_path {
            Some(path) => TagEventLog::open(config.monitor.event_buffer, path)?,
            None => TagEventLog::new(config.monitor.event_buffer),
        });
        let monitors = config
            .monitor
            .shares
            .iter()
            .map(|mapping| {
                Arc::new(FileMonitor::new(
                    mapping.clone(),
                    &config.monitor,
                    engine.clone(),
                    events.clone(),
                ))
            })
            .collect();

        let cancel = CancellationToken::new();
        let tracker = JobTracker::new(gateway.clone(), &config.jobs, cancel.clone());
        let orchestrator = TagObjectiveOrchestrator::new(
            gateway.clone(),
            store.clone(),
            tracker.clone(),
            &config.orchestrator,
        )
        .with_tag_writes(engine.write_mark());

        info!(
            fabric = %gateway.describe(),
            catalog = %store.db_path().display(),
            shares = config.monitor.shares.len(),
            "Tierflow initialized"
        );

        Ok(TierflowApi {
            state: Arc::new(ApiState {
                config,
                gateway,
                store,
                syncer,
                engine,
                orchestrator,
                tracker,
                events,
                monitors,
                registry: ToolRegistry::new(),
                cancel,
                tasks: tokio::sync::Mutex::new(Vec::new()),
            }),
        })
    }
}

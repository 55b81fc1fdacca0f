//! Background tasks, status, and monitor reporting.

use tracing::{info, warn};

use crate::api::responses::{
    CatalogStatus, GatewayStatus, IngestEventsResponse, MonitorListResponse, SystemStatus,
};
use crate::config::TierflowConfig;
use crate::error::Result;
use crate::models::EntityKind;
use crate::monitor::MonitorStatus;
use crate::TierflowApi;

impl TierflowApi {
    pub fn config(&self) -> &TierflowConfig {
        &self.state.config
    }

    /// Start one monitor per configured share and the periodic catalog sync.
    ///
    /// Returns false if background tasks are already running.
    pub async fn start_background(&self) -> bool {
        let mut tasks = self.state.tasks.lock().await;
        if !tasks.is_empty() || self.state.cancel.is_cancelled() {
            return false;
        }

        for monitor in &self.state.monitors {
            tasks.push(monitor.clone().spawn(self.state.cancel.clone()));
        }
        tasks.push(
            self.state
                .syncer
                .clone()
                .spawn_periodic(self.state.config.catalog.sync_interval(), self.state.cancel.clone()),
        );
        info!(monitors = self.state.monitors.len(), "Background tasks started");
        true
    }

    /// Stop background tasks and wait for them.
    ///
    /// In-flight work (one file tag, one entity-kind sync) finishes first.
    pub async fn shutdown(&self) {
        self.state.cancel.cancel();
        let tasks: Vec<_> = self.state.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Tierflow shut down");
    }

    pub fn is_running(&self) -> bool {
        !self.state.cancel.is_cancelled()
            && self
                .state
                .tasks
                .try_lock()
                .map(|tasks| !tasks.is_empty())
                .unwrap_or(true)
    }

    pub fn monitor_statuses(&self) -> Vec<MonitorStatus> {
        self.state.monitors.iter().map(|m| m.status()).collect()
    }

    pub fn get_file_monitor_status(&self) -> MonitorListResponse {
        MonitorListResponse {
            monitors: self.monitor_statuses(),
            running: self.is_running(),
        }
    }

    /// Recently tagged files, newest first.
    pub fn get_file_ingest_events(&self, limit: usize) -> IngestEventsResponse {
        let events = self.state.events.recent(limit);
        IngestEventsResponse {
            total: self.state.events.len(),
            events,
        }
    }

    pub async fn get_system_status(&self) -> Result<SystemStatus> {
        let stats = self.state.gateway.stats();
        let gateway = GatewayStatus {
            endpoint: self.state.gateway.describe(),
            total_requests: stats.total_requests,
            failed_requests: stats.failed_requests,
            active_requests: stats.active_requests,
            average_response_ms: stats.average_response_ms,
        };

        let catalog = match self.get_catalog_health().await {
            Ok(health) => CatalogStatus {
                healthy: health.healthy,
                total_items: health.total_items,
                stale_items: health.stale_items,
                last_sync: self
                    .state
                    .store
                    .last_success(EntityKind::File)
                    .ok()
                    .flatten(),
                error: None,
            },
            Err(e) => {
                warn!("Catalog health check failed: {}", e);
                CatalogStatus {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };

        Ok(SystemStatus {
            version: crate::VERSION.to_string(),
            gateway,
            catalog,
            monitors: self.monitor_statuses(),
            jobs: self.state.tracker.summary(),
        })
    }
}

//! Fabric → catalog synchronization.
//!
//! A full sync visits [`EntityKind::SYNC_ORDER`]. Each kind is fetched
//! completely and committed in its own transaction; a kind that fails is
//! reported and keeps its previous snapshot, without affecting the kinds
//! around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::store::CatalogStore;
use crate::cancel::CancellationToken;
use crate::error::{Result, TierflowError};
use crate::gateway::StorageGateway;
use crate::models::{Entity, EntityKind, Share};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl std::str::FromStr for SyncMode {
    type Err = TierflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(TierflowError::invalid_params(format!(
                "unknown sync mode '{}' (expected full or incremental)",
                other
            ))),
        }
    }
}

/// Outcome for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: EntityKind,
    pub success: bool,
    pub synced: usize,
    /// Not attempted (disabled by configuration or cancelled).
    pub skipped: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// True only if every attempted kind committed.
    pub success: bool,
    pub message: String,
    pub mode: SyncMode,
    pub since: Option<DateTime<Utc>>,
    /// An incremental request that ran as a full sync.
    pub degraded_to_full: bool,
    pub kinds: Vec<KindReport>,
    pub total_synced: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

/// Pulls entity snapshots from the fabric into the catalog store.
pub struct CatalogSyncer {
    gateway: Arc<dyn StorageGateway>,
    store: Arc<CatalogStore>,
    sync_files: bool,
    running: tokio::sync::Mutex<()>,
    last_report: RwLock<Option<SyncReport>>,
}

impl CatalogSyncer {
    pub fn new(gateway: Arc<dyn StorageGateway>, store: Arc<CatalogStore>, sync_files: bool) -> Self {
        Self {
            gateway,
            store,
            sync_files,
            running: tokio::sync::Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Sync every entity kind.
    ///
    /// Concurrent calls are serialized. Cancellation is checked between
    /// kinds, so a kind that has started always commits or fails as a unit.
    pub async fn sync_full(&self, cancel: &CancellationToken) -> SyncReport {
        let _guard = self.running.lock().await;
        let started_at = Utc::now();
        let started = Instant::now();

        let mut kinds = Vec::with_capacity(EntityKind::SYNC_ORDER.len());
        let mut shares: Option<Vec<Share>> = None;
        let mut cancelled = false;

        for kind in EntityKind::SYNC_ORDER {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                kinds.push(KindReport {
                    kind,
                    success: false,
                    synced: 0,
                    skipped: true,
                    error: None,
                });
                continue;
            }
            if kind == EntityKind::File && !self.sync_files {
                kinds.push(KindReport {
                    kind,
                    success: true,
                    synced: 0,
                    skipped: true,
                    error: None,
                });
                continue;
            }

            // Writes that land mid-listing must stay newer than the snapshot.
            let fetched_at = Utc::now();
            let outcome = match self.fetch(kind, shares.as_deref()).await {
                Ok(entities) => {
                    if kind == EntityKind::Share {
                        shares = Some(
                            entities
                                .iter()
                                .filter_map(|e| match e {
                                    Entity::Share(s) => Some(s.clone()),
                                    _ => None,
                                })
                                .collect(),
                        );
                    }
                    self.commit(kind, entities, fetched_at).await
                }
                Err(e) => Err(e),
            };

            kinds.push(match outcome {
                Ok(synced) => KindReport {
                    kind,
                    success: true,
                    synced,
                    skipped: false,
                    error: None,
                },
                Err(e) => {
                    let err = TierflowError::Sync {
                        kind: kind.to_string(),
                        message: e.to_string(),
                    };
                    warn!(kind = %kind, error = %e, "Catalog sync failed for kind");
                    let store = Arc::clone(&self.store);
                    let message = e.to_string();
                    let recorded = tokio::task::spawn_blocking(move || {
                        store.record_sync_failure(kind, &message, Utc::now())
                    })
                    .await;
                    if !matches!(recorded, Ok(Ok(()))) {
                        warn!(kind = %kind, "Could not record sync failure");
                    }
                    KindReport {
                        kind,
                        success: false,
                        synced: 0,
                        skipped: false,
                        error: Some(err.to_string()),
                    }
                }
            });
        }

        let total_synced = kinds.iter().map(|k| k.synced).sum();
        let failed: Vec<&KindReport> = kinds.iter().filter(|k| k.error.is_some()).collect();
        let success = failed.is_empty() && !cancelled;
        let message = if cancelled {
            format!("Sync cancelled after {} entities", total_synced)
        } else if failed.is_empty() {
            format!("Synced {} entities", total_synced)
        } else {
            let names: Vec<&str> = failed.iter().map(|k| k.kind.as_str()).collect();
            format!(
                "Synced {} entities; failed kinds: {}",
                total_synced,
                names.join(", ")
            )
        };

        let report = SyncReport {
            success,
            message,
            mode: SyncMode::Full,
            since: None,
            degraded_to_full: false,
            kinds,
            total_synced,
            started_at,
            finished_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
        };
        info!(
            success = report.success,
            total = report.total_synced,
            elapsed_ms = report.duration_ms,
            "Catalog sync finished"
        );
        *self.last_report.write().unwrap_or_else(|p| p.into_inner()) = Some(report.clone());
        report
    }

    /// Sync entities changed since `since`.
    ///
    /// The fabric has no change query, so this always runs a full sync and
    /// says so in the report.
    pub async fn sync_incremental(&self, since: DateTime<Utc>, cancel: &CancellationToken) -> SyncReport {
        warn!(%since, "Incremental sync is not supported by the fabric; running a full sync");
        let mut report = self.sync_full(cancel).await;
        report.mode = SyncMode::Incremental;
        report.since = Some(since);
        report.degraded_to_full = true;
        report.message = format!("{} (incremental request ran as a full sync)", report.message);
        *self.last_report.write().unwrap_or_else(|p| p.into_inner()) = Some(report.clone());
        report
    }

    /// Sync immediately, then every `interval`, until `cancel` fires.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Periodic catalog sync started");
            loop {
                let report = self.sync_full(&cancel).await;
                if !report.success && !report.cancelled {
                    warn!(message = %report.message, "Periodic catalog sync incomplete");
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Periodic catalog sync stopped");
        })
    }

    async fn fetch(&self, kind: EntityKind, shares: Option<&[Share]>) -> Result<Vec<Entity>> {
        let gw = &self.gateway;
        let entities = match kind {
            EntityKind::Node => gw.list_nodes().await?.into_iter().map(Entity::Node).collect(),
            EntityKind::StorageVolume => gw
                .list_storage_volumes()
                .await?
                .into_iter()
                .map(Entity::StorageVolume)
                .collect(),
            EntityKind::ObjectStorageVolume => gw
                .list_object_storage_volumes()
                .await?
                .into_iter()
                .map(Entity::ObjectStorageVolume)
                .collect(),
            EntityKind::Share => gw.list_shares().await?.into_iter().map(Entity::Share).collect(),
            EntityKind::File => {
                let shares = shares.ok_or_else(|| {
                    TierflowError::Other("share listing unavailable in this cycle".to_string())
                })?;
                let mut files = Vec::new();
                for share in shares {
                    for mut file in gw.list_files(&share.path, true).await? {
                        if file.share_uuid.is_none() {
                            file.share_uuid = Some(share.meta.uuid.clone());
                        }
                        files.push(Entity::File(file));
                    }
                }
                files
            }
            EntityKind::Job | EntityKind::Objective => {
                return Err(TierflowError::invalid_params(format!(
                    "{} entities are not synced into the catalog",
                    kind
                )))
            }
        };
        Ok(entities)
    }

    async fn commit(
        &self,
        kind: EntityKind,
        entities: Vec<Entity>,
        fetched_at: DateTime<Utc>,
    ) -> Result<usize> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.replace_kind(kind, &entities, fetched_at))
            .await
            .map_err(|e| TierflowError::Other(format!("catalog write task failed: {}", e)))?
    }
}

//! Catalog search, sync, health, and backup.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::responses::{BackupResponse, RestoreResponse};
use crate::catalog::{
    CatalogOverview, CatalogQuery, CatalogStore, HealthReport, SearchPage, SortField, SortOrder,
    SyncMode, SyncReport,
};
use crate::error::{Result, TierflowError};
use crate::models::EntityKind;
use crate::tools::args::SearchCatalogArgs;
use crate::TierflowApi;

impl SearchCatalogArgs {
    /// Convert to a store query, rejecting unknown kinds and sort fields.
    pub fn to_query(&self) -> Result<CatalogQuery> {
        let mut query = CatalogQuery {
            text: self.query.clone().filter(|q| !q.trim().is_empty()),
            share_uuid: self.share_uuid.clone(),
            volume_uuid: self.volume_uuid.clone(),
            node_uuid: self.node_uuid.clone(),
            path_prefix: self.path_prefix.clone(),
            tags: self.tags.clone(),
            limit: self.limit,
            offset: self.offset,
            ..Default::default()
        };
        if let Some(kind) = &self.item_type {
            query.item_type = Some(kind.parse::<EntityKind>()?);
        }
        if let Some(field) = &self.sort_by {
            query.sort = Some(field.parse::<SortField>()?);
        }
        if let Some(order) = &self.sort_order {
            query.order = order.parse::<SortOrder>()?;
        }
        Ok(query)
    }
}

async fn with_store<T, F>(store: &Arc<CatalogStore>, f: F) -> Result<T>
where
    F: FnOnce(&CatalogStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| TierflowError::Other(format!("catalog task failed: {}", e)))?
}

impl TierflowApi {
    pub async fn search_catalog(&self, query: CatalogQuery) -> Result<SearchPage> {
        with_store(&self.state.store, move |store| store.search(&query)).await
    }

    /// Sync the catalog now.
    ///
    /// `Incremental` needs `since` and currently performs a full sync; the
    /// report says so.
    pub async fn sync_catalog(&self, mode: SyncMode, since: Option<DateTime<Utc>>) -> Result<SyncReport> {
        let cancel = &self.state.cancel;
        match mode {
            SyncMode::Full => Ok(self.state.syncer.sync_full(cancel).await),
            SyncMode::Incremental => {
                let since = since.ok_or_else(|| {
                    TierflowError::invalid_params("incremental sync needs a 'since' timestamp")
                })?;
                Ok(self.state.syncer.sync_incremental(since, cancel).await)
            }
        }
    }

    pub async fn get_catalog_health(&self) -> Result<HealthReport> {
        with_store(&self.state.store, |store| store.health()).await
    }

    pub async fn get_catalog_overview(&self) -> Result<CatalogOverview> {
        with_store(&self.state.store, |store| store.overview()).await
    }

    pub async fn backup_catalog(&self, path: impl Into<PathBuf>) -> Result<BackupResponse> {
        let path = path.into();
        let written = with_store(&self.state.store, move |store| store.backup(&path)).await?;
        Ok(BackupResponse {
            backup_path: written.display().to_string(),
        })
    }

    /// Replace the catalog with the backup at `path`.
    ///
    /// A missing or invalid backup fails and leaves the catalog untouched.
    pub async fn restore_catalog(&self, path: impl Into<PathBuf>) -> Result<RestoreResponse> {
        let path = path.into();
        let restored_from = path.display().to_string();
        let total_items = with_store(&self.state.store, move |store| store.restore(&path)).await?;
        Ok(RestoreResponse {
            restored_from,
            total_items,
        })
    }
}

//! Turns tag predicates into batches of placement objectives.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::batch::{
    AlignmentReport, BatchResult, FileAlignment, MatchedFile, Rejection, ResolveSource, Resolved,
};
use crate::catalog::{CatalogQuery, CatalogStore, MAX_LIMIT};
use crate::config::OrchestratorConfig;
use crate::error::{Result, TierflowError};
use crate::gateway::StorageGateway;
use crate::jobs::JobTracker;
use crate::models::{EntityKind, Objective, ObjectiveRequest, ObjectiveType};
use crate::tagging::TagWriteMark;

/// Applies objectives to the files carrying a tag.
pub struct TagObjectiveOrchestrator {
    gateway: Arc<dyn StorageGateway>,
    store: Arc<CatalogStore>,
    tracker: JobTracker,
    config: OrchestratorConfig,
    tag_writes: Option<TagWriteMark>,
}

impl TagObjectiveOrchestrator {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        store: Arc<CatalogStore>,
        tracker: JobTracker,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            tracker,
            config: config.clone(),
            tag_writes: None,
        }
    }

    /// Treat the catalog as behind whenever `mark` moved after the last
    /// file sync fetched from the fabric.
    pub fn with_tag_writes(mut self, mark: TagWriteMark) -> Self {
        self.tag_writes = Some(mark);
        self
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Find files whose tag `key` equals `value`.
    pub async fn resolve(&self, key: &str, value: &str, source: ResolveSource) -> Result<Resolved> {
        if key.trim().is_empty() {
            return Err(TierflowError::invalid_params("tag name must not be empty"));
        }
        let source = match source {
            ResolveSource::Auto if self.catalog_usable().await? => ResolveSource::Catalog,
            ResolveSource::Auto => ResolveSource::Live,
            explicit => explicit,
        };

        let files = match source {
            ResolveSource::Catalog => self.search_catalog(key, value).await?,
            _ => {
                let mut files: Vec<MatchedFile> = self
                    .gateway
                    .search_files_by_tag(key, value)
                    .await?
                    .into_iter()
                    .map(MatchedFile::from)
                    .collect();
                files.sort_by(|a, b| a.path.cmp(&b.path));
                files
            }
        };
        debug!(key, value, source = %source, matches = files.len(), "Resolved tag predicate");
        Ok(Resolved { files, source })
    }

    /// Whether the catalog holds files fresh enough to answer a search.
    ///
    /// Tags written since the last file sync make it unusable regardless of
    /// `stale_fallback`, since the catalog cannot hold them yet.
    async fn catalog_usable(&self) -> Result<bool> {
        let store = self.store.clone();
        let check_staleness = self.config.stale_fallback;
        let last_write = self.tag_writes.as_ref().and_then(TagWriteMark::last);
        run_blocking(move || {
            if store.count(Some(EntityKind::File))? == 0 {
                return Ok(false);
            }
            let last = store.last_success(EntityKind::File)?;
            if let Some(written) = last_write {
                if last.map_or(true, |synced| written >= synced) {
                    debug!(%written, "Tags written since the last file sync");
                    return Ok(false);
                }
            }
            if !check_staleness {
                return Ok(true);
            }
            let Some(last) = last else {
                return Ok(false);
            };
            let age = chrono::Utc::now().signed_duration_since(last);
            Ok(age.to_std().map_or(true, |age| age <= store.staleness_threshold()))
        })
        .await
    }

    async fn search_catalog(&self, key: &str, value: &str) -> Result<Vec<MatchedFile>> {
        let store = self.store.clone();
        let base = CatalogQuery::new().kind(EntityKind::File).tag(key, value);
        run_blocking(move || {
            let mut files = Vec::new();
            let mut offset = 0;
            loop {
                let page = store.search(&base.clone().limit(MAX_LIMIT).offset(offset))?;
                let fetched = page.entries.len();
                files.extend(page.entries.into_iter().map(MatchedFile::from));
                offset += fetched;
                if fetched == 0 || offset >= page.total_count {
                    break;
                }
            }
            Ok(files)
        })
        .await
    }

    /// Resolve files by tag and apply `objective_type` to each of them.
    pub async fn apply_objective_by_tag(
        &self,
        key: &str,
        value: &str,
        objective_type: ObjectiveType,
        tier_name: Option<String>,
        source: ResolveSource,
    ) -> Result<BatchResult> {
        ObjectiveRequest::new(objective_type.clone(), "/", tier_name.clone()).validate()?;
        let resolved = self.resolve(key, value, source).await?;

        let mut result = if resolved.files.is_empty() {
            BatchResult::empty(format!("No files tagged {}={}", key, value))
        } else {
            let paths: Vec<String> = resolved.files.into_iter().map(|f| f.path).collect();
            self.apply_objective_to_files(&paths, objective_type, tier_name).await?
        };
        result.source = Some(resolved.source);
        Ok(result)
    }

    /// Submit one objective per path and track the resulting jobs.
    ///
    /// Not transactional: each path is accepted or rejected on its own.
    pub async fn apply_objective_to_files(
        &self,
        paths: &[String],
        objective_type: ObjectiveType,
        tier_name: Option<String>,
    ) -> Result<BatchResult> {
        ObjectiveRequest::new(objective_type.clone(), "/", tier_name.clone()).validate()?;
        if paths.is_empty() {
            return Ok(BatchResult::empty("No files given"));
        }

        let gateway = &self.gateway;
        let outcomes: Vec<(String, Result<_>)> = stream::iter(paths.iter().cloned())
            .map(|path| {
                let request = ObjectiveRequest::new(objective_type.clone(), path.clone(), tier_name.clone());
                async move {
                    let outcome = match request.validate() {
                        Ok(()) => gateway.create_objective(&request).await,
                        Err(e) => Err(e),
                    };
                    (path, outcome)
                }
            })
            .buffered(self.config.submit_concurrency.max(1))
            .collect()
            .await;

        let mut result = BatchResult::empty("");
        result.requested = paths.len();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(submission) => {
                    result.accepted += 1;
                    if let Some(objective_uuid) = submission.objective_uuid {
                        result.objective_ids.push(objective_uuid);
                    }
                    if let Some(job_uuid) = submission.job_uuid {
                        self.tracker.track(job_uuid.clone());
                        result.job_ids.push(job_uuid);
                    }
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Objective rejected");
                    result.rejections.push(Rejection {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        result.summarize(objective_type.as_str());
        info!(
            objective = %objective_type,
            accepted = result.accepted,
            rejected = result.rejections.len(),
            "Objective batch submitted"
        );
        Ok(result)
    }

    /// Compare matching files against their existing objectives without
    /// changing anything.
    pub async fn check_alignment(
        &self,
        key: &str,
        value: &str,
        objective_type: ObjectiveType,
        tier_name: Option<String>,
        max_files: usize,
    ) -> Result<AlignmentReport> {
        let resolved = self.resolve(key, value, ResolveSource::Auto).await?;
        let total_matches = resolved.files.len();
        let gateway = &self.gateway;

        let checks: Vec<(String, Result<Vec<Objective>>)> = stream::iter(
            resolved.files.into_iter().take(max_files).map(|f| f.path),
        )
        .map(|path| async move {
            let objectives = gateway.list_objectives(Some(path.as_str())).await;
            (path, objectives)
        })
        .buffered(self.config.submit_concurrency.max(1))
        .collect()
        .await;

        let mut report = AlignmentReport {
            success: true,
            message: String::new(),
            tag_name: key.to_string(),
            tag_value: value.to_string(),
            objective_type: objective_type.to_string(),
            tier_name: tier_name.clone(),
            total_matches,
            checked: checks.len(),
            aligned: Vec::new(),
            misaligned: Vec::new(),
            errors: Vec::new(),
            source: resolved.source,
        };
        for (path, objectives) in checks {
            match objectives {
                Ok(objectives) if objectives.iter().any(|o| o.matches(&objective_type, tier_name.as_deref())) => {
                    report.aligned.push(path)
                }
                Ok(_) => report.misaligned.push(path),
                Err(e) => report.errors.push(Rejection {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
        report.success = report.errors.is_empty() || report.checked > report.errors.len();
        report.message = format!(
            "{} of {} checked file(s) aligned with {}",
            report.aligned.len(),
            report.checked,
            objective_type
        );
        Ok(report)
    }

    /// Read-only check of one file against an objective.
    pub async fn check_file_alignment(
        &self,
        path: &str,
        objective_type: ObjectiveType,
        tier_name: Option<String>,
    ) -> Result<FileAlignment> {
        if path.trim().is_empty() {
            return Err(TierflowError::invalid_params("file path must not be empty"));
        }
        let objectives = self.gateway.list_objectives(Some(path)).await?;
        let aligned = objectives
            .iter()
            .any(|o| o.matches(&objective_type, tier_name.as_deref()));
        debug!(path, aligned, "Checked file alignment");
        Ok(FileAlignment {
            file_path: path.to_string(),
            objective_type: objective_type.to_string(),
            tier_name,
            aligned,
            objectives,
        })
    }

    pub async fn list_objectives(&self, path: Option<&str>) -> Result<Vec<Objective>> {
        self.gateway.list_objectives(path).await
    }

    pub async fn remove_objective(&self, objective_uuid: &str) -> Result<()> {
        if objective_uuid.trim().is_empty() {
            return Err(TierflowError::invalid_params("objective uuid must not be empty"));
        }
        self.gateway.remove_objective(objective_uuid).await?;
        info!(objective_uuid, "Removed objective");
        Ok(())
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TierflowError::Other(format!("catalog task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::catalog::CatalogSyncer;
    use crate::config::JobsConfig;
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use crate::models::{EntityMeta, FileEntry, JobState, Share, TagMap};
    use crate::tagging::TagEngine;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        gateway: Arc<InMemoryGateway>,
        store: Arc<CatalogStore>,
        engine: TagEngine,
        orchestrator: TagObjectiveOrchestrator,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_share(Share {
            meta: EntityMeta::new("s-1", "hub"),
            path: "/hub".into(),
            ..Default::default()
        });
        for (i, priority) in ["high", "high", "low"].iter().enumerate() {
            let mut file = FileEntry::new(format!("f-{}", i), format!("/hub/file{}.dat", i));
            file.tags.insert("user.priority".into(), priority.to_string());
            gateway.add_file(file);
        }
        let store = Arc::new(CatalogStore::new(temp.path().join("catalog.db")).unwrap());
        let jobs = JobsConfig {
            initial_poll_ms: 5,
            max_poll_ms: 20,
            background_polling: false,
            ..Default::default()
        };
        let tracker = JobTracker::new(gateway.clone(), &jobs, CancellationToken::new());
        let engine = TagEngine::new(gateway.clone(), "user");
        let orchestrator = TagObjectiveOrchestrator::new(
            gateway.clone(),
            store.clone(),
            tracker,
            &OrchestratorConfig::default(),
        )
        .with_tag_writes(engine.write_mark());
        Fixture {
            _temp: temp,
            gateway,
            store,
            engine,
            orchestrator,
        }
    }

    async fn sync(fx: &Fixture) {
        let syncer = CatalogSyncer::new(fx.gateway.clone(), fx.store.clone(), true);
        let report = syncer.sync_full(&CancellationToken::new()).await;
        assert!(report.success, "{}", report.message);
    }

    #[tokio::test]
    async fn test_zero_matches_is_empty_success() {
        let fx = fixture();
        let result = fx
            .orchestrator
            .apply_objective_by_tag(
                "user.priority",
                "urgent",
                ObjectiveType::PlaceOnTier,
                Some("tier0".into()),
                ResolveSource::Live,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.requested, 0);
        assert_eq!(result.accepted, 0);
        assert_eq!(result.rejected, 0);
        assert!(result.job_ids.is_empty());
        assert_eq!(fx.gateway.calls(GatewayOp::CreateObjective), 0);
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_live_when_catalog_empty() {
        let fx = fixture();
        let resolved = fx
            .orchestrator
            .resolve("user.priority", "high", ResolveSource::Auto)
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Live);
        assert_eq!(resolved.files.len(), 2);
    }

    #[tokio::test]
    async fn test_auto_uses_fresh_catalog() {
        let fx = fixture();
        sync(&fx).await;
        // A fabric-side change the catalog has not seen yet
        fx.gateway.remove_file("/hub/file0.dat");

        let resolved = fx
            .orchestrator
            .resolve("user.priority", "high", ResolveSource::Auto)
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Catalog);
        assert_eq!(resolved.files.len(), 2);
        assert_eq!(fx.gateway.calls(GatewayOp::SearchFiles), 0);
    }

    #[tokio::test]
    async fn test_auto_goes_live_after_tag_writes() {
        let fx = fixture();
        sync(&fx).await;

        let tags = TagMap::from([("priority".to_string(), "high".to_string())]);
        fx.engine.apply_tags("/hub/file2.dat", &tags).await.unwrap();

        let resolved = fx
            .orchestrator
            .resolve("user.priority", "high", ResolveSource::Auto)
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Live);
        assert_eq!(resolved.files.len(), 3);

        // A sync started after the write brings the catalog back in play
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        sync(&fx).await;
        let resolved = fx
            .orchestrator
            .resolve("user.priority", "high", ResolveSource::Auto)
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Catalog);
        assert_eq!(resolved.files.len(), 3);
    }

    #[tokio::test]
    async fn test_apply_by_tag_tracks_every_job() {
        let fx = fixture();
        sync(&fx).await;

        let result = fx
            .orchestrator
            .apply_objective_by_tag(
                "user.priority",
                "high",
                ObjectiveType::PlaceOnTier,
                Some("tier0".into()),
                ResolveSource::Catalog,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.requested, 2);
        assert_eq!(result.accepted, 2);
        assert_eq!(result.job_ids.len(), 2);
        assert_eq!(result.source, Some(ResolveSource::Catalog));
        for job in &result.job_ids {
            assert!(fx.orchestrator.tracker().is_tracked(job));
        }
    }

    #[tokio::test]
    async fn test_partial_rejection_is_reported_per_file() {
        let fx = fixture();
        fx.gateway.reject_objectives_for("/hub/file1.dat", "tier0 is full");
        let paths = vec!["/hub/file0.dat".to_string(), "/hub/file1.dat".to_string()];

        let result = fx
            .orchestrator
            .apply_objective_to_files(&paths, ObjectiveType::PlaceOnTier, Some("tier0".into()))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.rejected, 1);
        assert_eq!(result.rejections[0].path, "/hub/file1.dat");
        assert!(result.rejections[0].reason.contains("tier0 is full"));
        assert_eq!(fx.orchestrator.tracker().summary().total, 1);
    }

    #[tokio::test]
    async fn test_missing_tier_is_rejected_up_front() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .apply_objective_to_files(&["/hub/file0.dat".to_string()], ObjectiveType::PlaceOnTier, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TierflowError::InvalidParams { .. }));
        assert_eq!(fx.gateway.calls(GatewayOp::CreateObjective), 0);
    }

    #[tokio::test]
    async fn test_check_alignment_is_read_only() {
        let fx = fixture();
        fx.orchestrator
            .apply_objective_to_files(
                &["/hub/file0.dat".to_string()],
                ObjectiveType::PlaceOnTier,
                Some("tier0".into()),
            )
            .await
            .unwrap();
        let before = fx.gateway.calls(GatewayOp::CreateObjective);

        let report = fx
            .orchestrator
            .check_alignment("user.priority", "high", ObjectiveType::PlaceOnTier, Some("TIER0".into()), 50)
            .await
            .unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.aligned, vec!["/hub/file0.dat".to_string()]);
        assert_eq!(report.misaligned, vec!["/hub/file1.dat".to_string()]);
        assert_eq!(fx.gateway.calls(GatewayOp::CreateObjective), before);
    }

    #[tokio::test]
    async fn test_check_file_alignment_single_path() {
        let fx = fixture();
        fx.orchestrator
            .apply_objective_to_files(
                &["/hub/file1.dat".to_string()],
                ObjectiveType::PlaceOnTier,
                Some("tier1".into()),
            )
            .await
            .unwrap();

        let on_tier = fx
            .orchestrator
            .check_file_alignment("/hub/file1.dat", ObjectiveType::PlaceOnTier, Some("Tier1".into()))
            .await
            .unwrap();
        assert!(on_tier.aligned);
        assert_eq!(on_tier.objectives.len(), 1);

        let other_tier = fx
            .orchestrator
            .check_file_alignment("/hub/file1.dat", ObjectiveType::PlaceOnTier, Some("tier0".into()))
            .await
            .unwrap();
        assert!(!other_tier.aligned);

        let untouched = fx
            .orchestrator
            .check_file_alignment("/hub/file2.dat", ObjectiveType::PlaceOnTier, None)
            .await
            .unwrap();
        assert!(!untouched.aligned);
        assert!(untouched.objectives.is_empty());
    }

    #[tokio::test]
    async fn test_remove_objective_round_trip() {
        let fx = fixture();
        let result = fx
            .orchestrator
            .apply_objective_to_files(&["/hub/file2.dat".to_string()], ObjectiveType::Archive, None)
            .await
            .unwrap();
        let uuid = &result.objective_ids[0];

        assert_eq!(fx.orchestrator.list_objectives(Some("/hub/file2.dat")).await.unwrap().len(), 1);
        fx.orchestrator.remove_objective(uuid).await.unwrap();
        assert!(fx.orchestrator.list_objectives(None).await.unwrap().is_empty());

        let err = fx.orchestrator.remove_objective(uuid).await.unwrap_err();
        assert!(matches!(err, TierflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_jobs_from_batch_complete() {
        let fx = fixture();
        let result = fx
            .orchestrator
            .apply_objective_by_tag(
                "user.priority",
                "low",
                ObjectiveType::ExcludeFromTier,
                Some("tier0".into()),
                ResolveSource::Live,
            )
            .await
            .unwrap();
        let job = &result.job_ids[0];
        let status = fx
            .orchestrator
            .tracker()
            .wait_until_terminal(job, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);
    }
}

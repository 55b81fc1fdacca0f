//! Idempotent tag application.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::content::{self, ContentInfo};
use crate::error::{Result, TierflowError};
use crate::gateway::StorageGateway;
use crate::models::TagMap;

/// A file to tag: where to read it locally and how the fabric names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTarget {
    pub local: PathBuf,
    pub fabric_path: String,
}

impl TagTarget {
    pub fn new(local: impl Into<PathBuf>, fabric_path: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            fabric_path: fabric_path.into(),
        }
    }
}

/// Outcome of one tagging call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub path: String,
    pub fabric_path: String,
    /// The complete desired tag set.
    pub tags: TagMap,
    /// Whether a write was issued.
    pub changed: bool,
    /// Content hash the file carried before this call, if any.
    pub previous_hash: Option<String>,
}

/// Time of the most recent tag write, shared by clones.
///
/// Anything that mirrors fabric tags (the catalog) is behind the fabric if
/// it was fetched before this time.
#[derive(Debug, Clone, Default)]
pub struct TagWriteMark(Arc<AtomicI64>);

impl TagWriteMark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write that just completed.
    pub fn touch(&self) {
        self.0.fetch_max(Utc::now().timestamp_micros(), Ordering::SeqCst);
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            micros => DateTime::from_timestamp_micros(micros),
        }
    }
}

/// Computes content tags for files and applies them through the gateway.
///
/// Each call issues at most one write, and none when the fabric already
/// holds every desired value.
pub struct TagEngine {
    gateway: Arc<dyn StorageGateway>,
    namespace: String,
    extra_tags: TagMap,
    writes: TagWriteMark,
}

impl TagEngine {
    pub fn new(gateway: Arc<dyn StorageGateway>, namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            namespace: namespace.into(),
            extra_tags: TagMap::new(),
            writes: TagWriteMark::new(),
        }
    }

    /// Tags added to every file, as `key=value` under the namespace.
    pub fn with_extra_tags(mut self, extra: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_tags = extra.into_iter().collect();
        self
    }

    /// Handle advanced after every tag write this engine issues.
    pub fn write_mark(&self) -> TagWriteMark {
        self.writes.clone()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully qualified key for `name`; keys that already carry a namespace are kept.
    pub fn key(&self, name: &str) -> String {
        if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.{}", self.namespace, name)
        }
    }

    pub fn hash_key(&self) -> String {
        self.key("content_hash")
    }

    /// Hash and classify a local file on the blocking pool.
    pub async fn inspect(&self, target: &TagTarget) -> Result<ContentInfo> {
        let local = target.local.clone();
        tokio::task::spawn_blocking(move || content::inspect(&local))
            .await
            .map_err(|e| TierflowError::Other(format!("hash task failed: {}", e)))?
    }

    /// Compute content tags for `target` and apply them with `extra`.
    pub async fn tag_file(&self, target: &TagTarget, extra: &TagMap) -> Result<TagResult> {
        let info = self.inspect(target).await?;

        let mut desired = TagMap::new();
        desired.insert(self.key("content_hash"), info.hash);
        desired.insert(self.key("size"), info.size.to_string());
        desired.insert(self.key("mime_type"), info.mime_type);
        for (key, value) in self.extra_tags.iter().chain(extra) {
            desired.insert(self.key(key), value.clone());
        }

        let mut result = self.apply(&target.fabric_path, desired).await?;
        result.path = target.local.display().to_string();
        Ok(result)
    }

    /// Apply caller-supplied tags to a fabric path without reading content.
    pub async fn apply_tags(&self, fabric_path: &str, tags: &TagMap) -> Result<TagResult> {
        if tags.is_empty() {
            return Err(TierflowError::invalid_params("no tags given"));
        }
        let desired = tags.iter().map(|(k, v)| (self.key(k), v.clone())).collect();
        self.apply(fabric_path, desired).await
    }

    /// Apply the same tags to many fabric paths, `concurrency` writes at a time.
    ///
    /// Results keep the order of `paths`; one failure does not stop the rest.
    pub async fn apply_tags_to_all(
        &self,
        paths: Vec<String>,
        tags: &TagMap,
        concurrency: usize,
    ) -> Vec<(String, Result<TagResult>)> {
        stream::iter(paths)
            .map(|path| async move {
                let result = self.apply_tags(&path, tags).await;
                (path, result)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn apply(&self, fabric_path: &str, desired: TagMap) -> Result<TagResult> {
        let existing = self
            .gateway
            .get_file_tags(fabric_path)
            .await
            .map_err(|e| tagging_error(fabric_path, e))?;

        let previous_hash = existing.get(&self.hash_key()).cloned();
        let up_to_date = desired
            .iter()
            .all(|(key, value)| existing.get(key) == Some(value));

        if !up_to_date {
            self.gateway
                .set_file_tags(fabric_path, &desired)
                .await
                .map_err(|e| tagging_error(fabric_path, e))?;
            self.writes.touch();
            debug!(path = fabric_path, tags = desired.len(), "Applied tags");
        }

        Ok(TagResult {
            path: fabric_path.to_string(),
            fabric_path: fabric_path.to_string(),
            tags: desired,
            changed: !up_to_date,
            previous_hash,
        })
    }
}

fn tagging_error(path: &str, err: TierflowError) -> TierflowError {
    TierflowError::Tagging {
        path: path.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<InMemoryGateway>, TagEngine) {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(InMemoryGateway::new());
        let engine = TagEngine::new(gateway.clone(), "user");
        (dir, gateway, engine)
    }

    #[tokio::test]
    async fn test_apply_tags_to_all_reports_each_path() {
        let gateway = Arc::new(InMemoryGateway::strict());
        let engine = TagEngine::new(gateway.clone(), "user");
        gateway.add_file(crate::models::FileEntry::new("f-1", "/hub/set/a.bin"));
        gateway.add_file(crate::models::FileEntry::new("f-2", "/hub/set/b.bin"));
        let tags = TagMap::from([("user.modelsetid".to_string(), "gtc-3".to_string())]);
        let paths = vec![
            "/hub/set/a.bin".to_string(),
            "/hub/set/b.bin".to_string(),
            "/hub/set/missing.bin".to_string(),
        ];

        let results = engine.apply_tags_to_all(paths, &tags, 2).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.as_ref().unwrap().changed);
        assert!(results[1].1.as_ref().unwrap().changed);
        assert_eq!(results[2].0, "/hub/set/missing.bin");
        assert!(matches!(results[2].1, Err(TierflowError::Tagging { .. })));
        assert_eq!(gateway.calls(GatewayOp::SetTags), 2);
    }

    #[tokio::test]
    async fn test_second_tag_is_noop() {
        let (dir, gateway, engine) = setup();
        let local = dir.path().join("report.json");
        std::fs::write(&local, br#"{"a":1}"#).unwrap();
        let target = TagTarget::new(&local, "/hub/report.json");

        let first = engine.tag_file(&target, &TagMap::new()).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.tags["user.size"], "7");
        assert_eq!(first.tags["user.mime_type"], "application/json");
        assert!(first.previous_hash.is_none());

        let second = engine.tag_file(&target, &TagMap::new()).await.unwrap();
        assert!(!second.changed);
        assert_eq!(gateway.calls(GatewayOp::SetTags), 1);
    }

    #[tokio::test]
    async fn test_modified_content_is_retagged() {
        let (dir, gateway, engine) = setup();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"one").unwrap();
        let target = TagTarget::new(&local, "/hub/a.txt");
        let first = engine.tag_file(&target, &TagMap::new()).await.unwrap();

        std::fs::write(&local, b"two!").unwrap();
        let second = engine.tag_file(&target, &TagMap::new()).await.unwrap();
        assert!(second.changed);
        assert_eq!(second.previous_hash, Some(first.tags["user.content_hash"].clone()));
        assert_eq!(gateway.calls(GatewayOp::SetTags), 2);
    }

    #[tokio::test]
    async fn test_extra_tags_are_namespaced_and_written_once() {
        let (dir, gateway, engine) = setup();
        let engine = engine.with_extra_tags([("source".to_string(), "ingest".to_string())]);
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"x").unwrap();

        let mut extra = TagMap::new();
        extra.insert("priority".into(), "high".into());
        let result = engine
            .tag_file(&TagTarget::new(&local, "/hub/a.txt"), &extra)
            .await
            .unwrap();

        assert_eq!(result.tags["user.priority"], "high");
        assert_eq!(result.tags["user.source"], "ingest");
        assert_eq!(gateway.calls(GatewayOp::SetTags), 1);
        assert_eq!(gateway.file("/hub/a.txt").unwrap().tags.len(), 5);
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_tagging_error() {
        let (dir, gateway, engine) = setup();
        let local = dir.path().join("a.txt");
        std::fs::write(&local, b"x").unwrap();
        gateway.fail_next(
            GatewayOp::SetTags,
            TierflowError::Authentication {
                message: "denied".into(),
            },
        );

        let err = engine
            .tag_file(&TagTarget::new(&local, "/hub/a.txt"), &TagMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TierflowError::Tagging { ref path, .. } if path == "/hub/a.txt"));
    }

    #[tokio::test]
    async fn test_apply_tags_without_content() {
        let (_dir, gateway, engine) = setup();
        let mut tags = TagMap::new();
        tags.insert("priority".into(), "high".into());
        tags.insert("team.owner".into(), "media".into());

        let result = engine.apply_tags("/hub/x", &tags).await.unwrap();
        assert!(result.changed);
        assert!(result.tags.contains_key("user.priority"));
        assert!(result.tags.contains_key("team.owner"));
        assert!(!engine.apply_tags("/hub/x", &tags).await.unwrap().changed);
        assert_eq!(gateway.calls(GatewayOp::SetTags), 1);
    }

    #[tokio::test]
    async fn test_write_mark_moves_only_on_writes() {
        let (_dir, _gateway, engine) = setup();
        let mark = engine.write_mark();
        assert!(mark.last().is_none());

        let mut tags = TagMap::new();
        tags.insert("priority".into(), "high".into());
        let before = Utc::now();
        engine.apply_tags("/hub/x", &tags).await.unwrap();
        let written = mark.last().unwrap();
        assert!(written >= before - chrono::Duration::milliseconds(1));

        engine.apply_tags("/hub/x", &tags).await.unwrap();
        assert_eq!(mark.last(), Some(written));
    }
}

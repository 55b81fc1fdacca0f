//! Per-share scan loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::events::{TagEvent, TagEventKind, TagEventLog};
use super::watcher::ShareWatcher;
use crate::cancel::CancellationToken;
use crate::config::{MonitorConfig, ShareMapping};
use crate::error::{Result, TierflowError};
use crate::models::TagMap;
use crate::tagging::{TagEngine, TagResult, TagTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Scanning,
    Stopped,
}

/// Cumulative counters for one monitored share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub share: String,
    pub local_root: String,
    pub state: MonitorState,
    pub cycles: u64,
    pub files_tagged: u64,
    pub files_unchanged: u64,
    pub files_skipped: u64,
    pub errors: u64,
    pub seen_entries: usize,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_scan_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub examined: usize,
    pub tagged: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
    /// The scan stopped early on cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    size: u64,
    modified: Option<SystemTime>,
}

struct Candidate {
    path: PathBuf,
    fingerprint: Fingerprint,
}

/// Files already confirmed tagged, with the fingerprint they had then.
///
/// Bounded; the oldest entry is evicted first.
#[derive(Debug)]
struct SeenSet {
    capacity: usize,
    entries: HashMap<PathBuf, Fingerprint>,
    order: VecDeque<PathBuf>,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn contains(&self, path: &Path, fingerprint: Fingerprint) -> bool {
        self.entries.get(path) == Some(&fingerprint)
    }

    fn insert(&mut self, path: PathBuf, fingerprint: Fingerprint) {
        if self.entries.insert(path.clone(), fingerprint).is_none() {
            self.order.push_back(path);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    /// Forget files that no longer exist.
    fn retain_present(&mut self, present: &HashSet<PathBuf>) {
        self.entries.retain(|path, _| present.contains(path));
        self.order.retain(|path| present.contains(path));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Enumeration {
    files: Vec<Candidate>,
    skipped: usize,
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

/// List regular files in stable name order.
fn enumerate(root: &Path, recursive: bool, min_age: Duration) -> Result<Enumeration> {
    if !root.is_dir() {
        return Err(TierflowError::not_found(format!("share directory {}", root.display())));
    }

    let mut files = Vec::new();
    let mut skipped = 0;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                skipped += 1;
                continue;
            }
        };
        let modified = metadata.modified().ok();
        if !min_age.is_zero() {
            let age = modified
                .and_then(|m| m.elapsed().ok())
                .unwrap_or(Duration::ZERO);
            if age < min_age {
                debug!(path = %entry.path().display(), "Skipping file still being written");
                skipped += 1;
                continue;
            }
        }
        files.push(Candidate {
            path: entry.into_path(),
            fingerprint: Fingerprint {
                size: metadata.len(),
                modified,
            },
        });
    }

    Ok(Enumeration { files, skipped })
}

/// Discovers and tags files under one watched share.
pub struct FileMonitor {
    mapping: ShareMapping,
    config: MonitorConfig,
    engine: Arc<TagEngine>,
    events: Arc<TagEventLog>,
    seen: Mutex<SeenSet>,
    status: RwLock<MonitorStatus>,
}

impl FileMonitor {
    pub fn new(
        mapping: ShareMapping,
        config: &MonitorConfig,
        engine: Arc<TagEngine>,
        events: Arc<TagEventLog>,
    ) -> Self {
        let status = MonitorStatus {
            share: mapping.fabric_root.clone(),
            local_root: mapping.local_root.display().to_string(),
            state: MonitorState::Idle,
            cycles: 0,
            files_tagged: 0,
            files_unchanged: 0,
            files_skipped: 0,
            errors: 0,
            seen_entries: 0,
            last_scan_at: None,
            last_scan_duration_ms: None,
            last_error: None,
        };
        Self {
            seen: Mutex::new(SeenSet::new(config.seen_capacity)),
            status: RwLock::new(status),
            config: config.clone(),
            mapping,
            engine,
            events,
        }
    }

    pub fn mapping(&self) -> &ShareMapping {
        &self.mapping
    }

    pub fn status(&self) -> MonitorStatus {
        self.status.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn update_status(&self, f: impl FnOnce(&mut MonitorStatus)) {
        let mut status = self.status.write().unwrap_or_else(|p| p.into_inner());
        f(&mut status);
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, SeenSet> {
        self.seen.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one scan cycle.
    ///
    /// Cancellation is observed between files; the file being tagged when
    /// the token fires is finished first.
    pub async fn scan_once(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        let started = Instant::now();
        self.update_status(|s| s.state = MonitorState::Scanning);

        let outcome = self.scan_files(cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let seen_entries = self.seen().len();

        self.update_status(|s| {
            s.state = MonitorState::Idle;
            s.cycles += 1;
            s.last_scan_at = Some(Utc::now());
            s.last_scan_duration_ms = Some(elapsed_ms);
            s.seen_entries = seen_entries;
            match &outcome {
                Ok(report) => {
                    s.files_tagged += report.tagged as u64;
                    s.files_unchanged += report.unchanged as u64;
                    s.files_skipped += report.skipped as u64;
                    s.errors += report.errors as u64;
                }
                Err(e) => {
                    s.errors += 1;
                    s.last_error = Some(e.to_string());
                }
            }
        });

        if let Ok(report) = &outcome {
            if report.tagged > 0 || report.errors > 0 {
                info!(
                    share = %self.mapping.fabric_root,
                    tagged = report.tagged,
                    unchanged = report.unchanged,
                    errors = report.errors,
                    elapsed_ms,
                    "Scan cycle finished"
                );
            }
        }
        outcome
    }

    async fn scan_files(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        let root = self.mapping.local_root.clone();
        let recursive = self.config.recursive;
        let min_age = self.config.min_file_age();
        let listing = tokio::task::spawn_blocking(move || enumerate(&root, recursive, min_age))
            .await
            .map_err(|e| TierflowError::Other(format!("enumeration task failed: {}", e)))??;

        let mut report = ScanReport {
            skipped: listing.skipped,
            ..Default::default()
        };
        let present: HashSet<PathBuf> = listing.files.iter().map(|c| c.path.clone()).collect();

        for candidate in listing.files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if self.seen().contains(&candidate.path, candidate.fingerprint) {
                continue;
            }
            let Some(fabric_path) = self.mapping.fabric_path_for(&candidate.path) else {
                report.skipped += 1;
                continue;
            };

            report.examined += 1;
            let target = TagTarget::new(candidate.path.clone(), fabric_path);
            match self.engine.tag_file(&target, &TagMap::new()).await {
                Ok(result) => {
                    if result.changed {
                        report.tagged += 1;
                        self.events.record(self.event_for(&result));
                    } else {
                        report.unchanged += 1;
                    }
                    self.seen().insert(candidate.path, candidate.fingerprint);
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(path = %target.local.display(), error = %e, "Failed to tag file; will retry next cycle");
                    self.update_status(|s| s.last_error = Some(e.to_string()));
                }
            }
        }

        if !report.cancelled {
            self.seen().retain_present(&present);
        }
        Ok(report)
    }

    fn event_for(&self, result: &TagResult) -> TagEvent {
        let tag = |name: &str| result.tags.get(&self.engine.key(name)).cloned();
        TagEvent {
            timestamp: Utc::now(),
            event_type: if result.previous_hash.is_some() {
                TagEventKind::Retag
            } else {
                TagEventKind::NewFile
            },
            share: self.mapping.fabric_root.clone(),
            local_path: result.path.clone(),
            fabric_path: result.fabric_path.clone(),
            content_hash: tag("content_hash"),
            mime_type: tag("mime_type"),
            size_bytes: tag("size").and_then(|s| s.parse().ok()),
        }
    }

    /// Run the scan loop on the current runtime until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let wake = Arc::new(Notify::new());
        let _watcher = if self.config.use_notifications {
            match ShareWatcher::new(&self.mapping.local_root, self.config.recursive, wake.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(share = %self.mapping.fabric_root, error = %e, "Change notifications unavailable; polling only");
                    None
                }
            }
        } else {
            None
        };

        info!(
            share = %self.mapping.fabric_root,
            root = %self.mapping.local_root.display(),
            "File monitor started"
        );
        let interval = self.config.poll_interval();

        while !cancel.is_cancelled() {
            if let Err(e) = self.scan_once(&cancel).await {
                warn!(share = %self.mapping.fabric_root, error = %e, "Scan cycle failed");
            }
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
                _ = wake.notified() => debug!(share = %self.mapping.fabric_root, "Woken by change notification"),
            }
        }

        self.update_status(|s| s.state = MonitorState::Stopped);
        info!(share = %self.mapping.fabric_root, "File monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        gateway: Arc<InMemoryGateway>,
        events: Arc<TagEventLog>,
        monitor: Arc<FileMonitor>,
    }

    fn fixture(configure: impl FnOnce(&mut MonitorConfig)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(InMemoryGateway::new());
        let engine = Arc::new(TagEngine::new(gateway.clone(), "user"));
        let events = Arc::new(TagEventLog::new(100));
        let mut config = MonitorConfig {
            use_notifications: false,
            poll_interval_ms: 20,
            ..Default::default()
        };
        configure(&mut config);
        let monitor = Arc::new(FileMonitor::new(
            ShareMapping::new(dir.path(), "/hub"),
            &config,
            engine,
            events.clone(),
        ));
        Fixture {
            dir,
            gateway,
            events,
            monitor,
        }
    }

    fn write(fx: &Fixture, name: &str, bytes: &[u8]) {
        let path = fx.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_scan_tags_regular_visible_files() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        write(&fx, "b.txt", b"beta");
        write(&fx, ".partial", b"hidden");
        write(&fx, "sub/c.txt", b"nested");

        let report = fx.monitor.scan_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.tagged, 2);
        assert_eq!(fx.gateway.calls(GatewayOp::SetTags), 2);
        assert!(fx.gateway.file("/hub/a.txt").is_some());
        assert!(fx.gateway.file("/hub/.partial").is_none());
        assert!(fx.gateway.file("/hub/sub/c.txt").is_none());

        let events = fx.events.recent(10);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == TagEventKind::NewFile));
    }

    #[tokio::test]
    async fn test_rescan_of_unchanged_files_issues_no_calls() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        write(&fx, "b.txt", b"beta");
        let cancel = CancellationToken::new();

        fx.monitor.scan_once(&cancel).await.unwrap();
        let reads = fx.gateway.calls(GatewayOp::GetTags);
        let second = fx.monitor.scan_once(&cancel).await.unwrap();

        assert_eq!(second.examined, 0);
        assert_eq!(fx.gateway.calls(GatewayOp::SetTags), 2);
        assert_eq!(fx.gateway.calls(GatewayOp::GetTags), reads);
        assert_eq!(fx.monitor.status().cycles, 2);
    }

    #[tokio::test]
    async fn test_modified_file_is_retagged() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        let cancel = CancellationToken::new();
        fx.monitor.scan_once(&cancel).await.unwrap();

        write(&fx, "a.txt", b"alpha, revised");
        let report = fx.monitor.scan_once(&cancel).await.unwrap();
        assert_eq!(report.tagged, 1);
        assert_eq!(fx.events.recent(1)[0].event_type, TagEventKind::Retag);
        assert_eq!(fx.events.recent(1)[0].size_bytes, Some(14));
    }

    #[tokio::test]
    async fn test_failed_file_is_retried_next_cycle() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        fx.gateway.fail_next(
            GatewayOp::SetTags,
            TierflowError::Api {
                message: "unavailable".into(),
                status: Some(503),
            },
        );
        let cancel = CancellationToken::new();

        let first = fx.monitor.scan_once(&cancel).await.unwrap();
        assert_eq!(first.errors, 1);
        assert!(fx.monitor.status().last_error.is_some());

        let second = fx.monitor.scan_once(&cancel).await.unwrap();
        assert_eq!(second.tagged, 1);
        assert_eq!(fx.monitor.status().errors, 1);
    }

    #[tokio::test]
    async fn test_recursive_scan_and_min_age() {
        let fx = fixture(|c| c.recursive = true);
        write(&fx, "sub/deep/c.txt", b"nested");
        write(&fx, ".git/HEAD", b"ref");
        let report = fx.monitor.scan_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.tagged, 1);
        assert!(fx.gateway.file("/hub/sub/deep/c.txt").is_some());

        let young = fixture(|c| c.min_file_age_ms = 60_000);
        write(&young, "fresh.txt", b"still writing");
        let report = young.monitor.scan_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.tagged, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_between_files() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fx.monitor.scan_once(&cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(fx.gateway.calls(GatewayOp::SetTags), 0);
    }

    #[tokio::test]
    async fn test_missing_root_is_reported() {
        let fx = fixture(|_| {});
        let monitor = FileMonitor::new(
            ShareMapping::new(fx.dir.path().join("gone"), "/gone"),
            &MonitorConfig::default(),
            Arc::new(TagEngine::new(fx.gateway.clone(), "user")),
            fx.events.clone(),
        );
        let err = monitor.scan_once(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TierflowError::NotFound { .. }));
        assert_eq!(monitor.status().errors, 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_cancel() {
        let fx = fixture(|_| {});
        write(&fx, "a.txt", b"alpha");
        let cancel = CancellationToken::new();
        let handle = fx.monitor.clone().spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let status = fx.monitor.status();
        assert_eq!(status.state, MonitorState::Stopped);
        assert!(status.cycles >= 1);
        assert_eq!(fx.gateway.calls(GatewayOp::SetTags), 1);
    }

    #[test]
    fn test_seen_set_evicts_oldest() {
        let fp = Fingerprint {
            size: 1,
            modified: None,
        };
        let mut seen = SeenSet::new(2);
        seen.insert(PathBuf::from("a"), fp);
        seen.insert(PathBuf::from("b"), fp);
        seen.insert(PathBuf::from("c"), fp);

        assert!(!seen.contains(Path::new("a"), fp));
        assert!(seen.contains(Path::new("c"), fp));
        assert!(!seen.contains(Path::new("c"), Fingerprint { size: 2, modified: None }));
        assert_eq!(seen.len(), 2);
    }
}

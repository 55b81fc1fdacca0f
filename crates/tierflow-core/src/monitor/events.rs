//! Record of tagging outcomes produced by the file monitors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::{Result, TierflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagEventKind {
    /// First time the file was tagged.
    NewFile,
    /// Content changed since the previous tagging.
    Retag,
}

/// One tag write issued by a monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: TagEventKind,
    pub share: String,
    pub local_path: String,
    pub fabric_path: String,
    pub content_hash: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Bounded in-memory event ring, optionally mirrored to a JSONL file.
#[derive(Debug)]
pub struct TagEventLog {
    events: Mutex<VecDeque<TagEvent>>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl TagEventLog {
    /// An in-memory log holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            path: None,
        }
    }

    /// A log mirrored to `path`, seeded with the newest events already in it.
    ///
    /// Malformed lines in an existing file are skipped.
    pub fn open(capacity: usize, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut log = Self::new(capacity);

        if path.exists() {
            let file = std::fs::File::open(&path).map_err(|e| TierflowError::io_with_path(e, &path))?;
            let mut events = VecDeque::new();
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| TierflowError::io_with_path(e, &path))?;
                if let Ok(event) = serde_json::from_str::<TagEvent>(&line) {
                    events.push_back(event);
                    if events.len() > log.capacity {
                        events.pop_front();
                    }
                }
            }
            log.events = Mutex::new(events);
        } else if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TierflowError::io_with_path(e, parent))?;
        }

        log.path = Some(path);
        Ok(log)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, event: TagEvent) {
        if let Some(path) = &self.path {
            if let Err(e) = append_line(path, &event) {
                warn!(path = %path.display(), error = %e, "Failed to append tag event");
            }
        }

        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// The newest `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TagEvent> {
        let events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn append_line(path: &Path, event: &TagEvent) -> Result<()> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TierflowError::io_with_path(e, path))?;
    file.write_all(line.as_bytes())
        .map_err(|e| TierflowError::io_with_path(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(name: &str) -> TagEvent {
        TagEvent {
            timestamp: Utc::now(),
            event_type: TagEventKind::NewFile,
            share: "/hub".into(),
            local_path: format!("/mnt/hub/{}", name),
            fabric_path: format!("/hub/{}", name),
            content_hash: Some("abc".into()),
            mime_type: Some("text/plain".into()),
            size_bytes: Some(3),
        }
    }

    #[test]
    fn test_ring_is_bounded_and_newest_first() {
        let log = TagEventLog::new(2);
        log.record(event("a"));
        log.record(event("b"));
        log.record(event("c"));

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].fabric_path, "/hub/c");
        assert_eq!(recent[1].fabric_path, "/hub/b");
    }

    #[test]
    fn test_jsonl_mirror_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/events.jsonl");

        let log = TagEventLog::open(10, &path).unwrap();
        log.record(event("a"));
        log.record(event("b"));
        drop(log);

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let reopened = TagEventLog::open(10, &path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.recent(1)[0].fabric_path, "/hub/b");
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let json = serde_json::to_value(event("a")).unwrap();
        assert_eq!(json["event_type"], "new_file");
    }
}

//! Filesystem change notifications for a watched share.
//!
//! Notifications only wake the monitor early; the interval scan still
//! runs, so a dropped event delays tagging by at most one poll interval.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{Result, TierflowError};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Keeps a debounced watcher alive and signals `wake` on relevant changes.
pub struct ShareWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl ShareWatcher {
    pub fn new(root: &Path, recursive: bool, wake: Arc<Notify>) -> Result<Self> {
        // Events may arrive with the root resolved through symlinks
        let roots: Vec<PathBuf> = std::iter::once(root.to_path_buf())
            .chain(root.canonicalize().ok())
            .collect();
        let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| match result {
            Ok(events) => {
                if events.iter().any(|event| is_relevant_change(&roots, &event.path)) {
                    debug!(count = events.len(), "Share change detected");
                    wake.notify_one();
                }
            }
            Err(e) => warn!("File watcher error: {:?}", e),
        })
        .map_err(|e| TierflowError::Other(format!("Failed to create file watcher: {}", e)))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        debouncer
            .watcher()
            .watch(root, mode)
            .map_err(|e| TierflowError::Other(format!("Failed to watch {}: {}", root.display(), e)))?;

        info!("Watching {:?} for changes", root);
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// Changes to hidden files or anything inside a hidden directory below the
/// watched root are ignored. Hidden directories above the root do not count.
fn is_relevant_change(roots: &[PathBuf], path: &Path) -> bool {
    let relative = roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    !relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
    })
}

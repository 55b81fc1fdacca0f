//! File discovery and tagging for watched shares.
//!
//! One [`FileMonitor`] runs per share. Each cycle enumerates the share's
//! local mount, skips files it has already confirmed, and hands the rest
//! to the [`TagEngine`](crate::tagging::TagEngine).

mod events;
mod scanner;
mod watcher;

pub use events::{TagEvent, TagEventKind, TagEventLog};
pub use scanner::{FileMonitor, MonitorState, MonitorStatus, ScanReport};

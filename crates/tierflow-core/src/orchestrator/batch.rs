//! Result types for objective batches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TierflowError;
use crate::models::{CatalogEntry, FileEntry, Objective, TagMap};

/// Where matching files are looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResolveSource {
    /// Catalog when it is populated and fresh, live search otherwise.
    #[default]
    Auto,
    Catalog,
    Live,
}

impl ResolveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveSource::Auto => "auto",
            ResolveSource::Catalog => "catalog",
            ResolveSource::Live => "live",
        }
    }
}

impl fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolveSource {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(ResolveSource::Auto),
            "catalog" => Ok(ResolveSource::Catalog),
            "live" | "fabric" => Ok(ResolveSource::Live),
            other => Err(TierflowError::invalid_params(format!(
                "unknown source '{}' (expected auto, catalog, or live)",
                other
            ))),
        }
    }
}

/// A file matched by a tag predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFile {
    pub path: String,
    pub name: String,
    pub uuid: String,
    pub size_bytes: Option<u64>,
    pub share_uuid: Option<String>,
    pub tags: TagMap,
}

impl From<CatalogEntry> for MatchedFile {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            path: entry.path.unwrap_or_default(),
            name: entry.name,
            uuid: entry.uuid,
            size_bytes: entry.size_bytes,
            share_uuid: entry.share_uuid,
            tags: entry.tags,
        }
    }
}

impl From<FileEntry> for MatchedFile {
    fn from(file: FileEntry) -> Self {
        Self {
            path: file.path,
            name: file.meta.name,
            uuid: file.meta.uuid,
            size_bytes: file.size_bytes,
            share_uuid: file.share_uuid,
            tags: file.tags,
        }
    }
}

/// Files matching a predicate plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    pub files: Vec<MatchedFile>,
    /// `catalog` or `live`; never `auto`.
    pub source: ResolveSource,
}

/// A file the fabric refused, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub path: String,
    pub reason: String,
}

/// Outcome of applying one objective to a set of files.
///
/// Partial acceptance is a normal outcome; `rejections` lists every file
/// that did not get a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub message: String,
    pub requested: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub job_ids: Vec<String>,
    pub objective_ids: Vec<String>,
    pub rejections: Vec<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResolveSource>,
}

impl BatchResult {
    /// A batch that matched nothing.
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            requested: 0,
            accepted: 0,
            rejected: 0,
            job_ids: Vec::new(),
            objective_ids: Vec::new(),
            rejections: Vec::new(),
            source: None,
        }
    }

    pub(crate) fn summarize(&mut self, objective: &str) {
        self.rejected = self.rejections.len();
        self.success = self.requested == 0 || self.accepted > 0;
        self.message = match (self.accepted, self.rejected) {
            (_, 0) => format!("Applied {} to {} file(s)", objective, self.accepted),
            (0, rejected) => format!("Fabric rejected {} for all {} file(s)", objective, rejected),
            (accepted, rejected) => format!(
                "Applied {} to {} of {} file(s); {} rejected",
                objective, accepted, self.requested, rejected
            ),
        };
    }
}

/// Read-only comparison of matching files against existing objectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub success: bool,
    pub message: String,
    pub tag_name: String,
    pub tag_value: String,
    pub objective_type: String,
    pub tier_name: Option<String>,
    pub total_matches: usize,
    pub checked: usize,
    pub aligned: Vec<String>,
    pub misaligned: Vec<String>,
    pub errors: Vec<Rejection>,
    pub source: ResolveSource,
}

/// Whether one file already carries a given objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAlignment {
    pub file_path: String,
    pub objective_type: String,
    pub tier_name: Option<String>,
    pub aligned: bool,
    /// Every objective registered for the file.
    pub objectives: Vec<Objective>,
}

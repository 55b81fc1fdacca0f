//! Payloads of tool responses.
//!
//! Each is flattened next to `success` and `message` by
//! [`ApiResponse`](crate::models::ApiResponse).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::JobSummary;
use crate::models::{FileEntry, JobStatus, Objective, Share, TagMap};
use crate::monitor::{MonitorStatus, TagEvent};
use crate::orchestrator::{BatchResult, MatchedFile, Rejection, ResolveSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSearchResponse {
    pub matching_files: Vec<MatchedFile>,
    pub total_count: usize,
    pub source: ResolveSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatus>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareListResponse {
    pub shares: Vec<Share>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub path: String,
    pub files: Vec<FileEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryTagResponse {
    pub path: String,
    pub tag_name: String,
    pub tag_value: String,
    pub files_found: usize,
    pub tagged: usize,
    /// Files that already carried the tag.
    pub unchanged: usize,
    pub failures: Vec<Rejection>,
}

/// Outcome of tagging recently changed files and placing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub path: String,
    pub age_minutes: u64,
    /// `mtime` or `ctime`.
    pub time_type: String,
    pub files_found: usize,
    pub files_tagged: usize,
    /// The first few ingested paths.
    pub new_files: Vec<String>,
    pub tag_applied: String,
    pub tag_failures: Vec<Rejection>,
    /// Absent when nothing was found or nothing could be tagged.
    pub placement: Option<BatchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTagsResponse {
    pub path: String,
    pub tags: TagMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveListResponse {
    pub objectives: Vec<Objective>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveRemovedResponse {
    pub objective_uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupResponse {
    pub backup_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub restored_from: String,
    pub total_items: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorListResponse {
    pub monitors: Vec<MonitorStatus>,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEventsResponse {
    pub events: Vec<TagEvent>,
    pub total: usize,
}

/// Fabric endpoint and request counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub endpoint: String,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub active_requests: u64,
    pub average_response_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStatus {
    pub healthy: bool,
    pub total_items: u64,
    pub stale_items: u64,
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub gateway: GatewayStatus,
    pub catalog: CatalogStatus,
    pub monitors: Vec<MonitorStatus>,
    pub jobs: JobSummary,
}

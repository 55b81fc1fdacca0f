//! Typed argument sets for each tool.
//!
//! Field docs double as the descriptions in the published JSON schemas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::TagMap;
use crate::orchestrator::ResolveSource;

fn default_wait_secs() -> u64 {
    300
}

fn default_alignment_files() -> usize {
    50
}

fn default_event_limit() -> usize {
    50
}

fn default_ingest_age() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_ingest_objective() -> String {
    "place_on_tier".to_string()
}

fn default_ingest_tier() -> Option<String> {
    Some("tier1".to_string())
}

fn default_sync_mode() -> String {
    "full".to_string()
}

/// Arguments for tools that take none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchFilesByTagArgs {
    /// Full tag key, e.g. `user.priority`.
    pub tag_name: String,
    pub tag_value: String,
    /// `auto` (default), `catalog`, or `live`.
    #[serde(default)]
    pub source: ResolveSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplyObjectiveToFilesArgs {
    /// Fabric paths to apply the objective to.
    pub file_paths: Vec<String>,
    /// e.g. `place_on_tier`, `exclude_from_tier`, `replication`.
    pub objective_type: String,
    /// Required for tier objectives.
    #[serde(default)]
    pub tier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApplyObjectiveByTagArgs {
    pub tag_name: String,
    pub tag_value: String,
    pub objective_type: String,
    #[serde(default)]
    pub tier_name: Option<String>,
    #[serde(default)]
    pub source: ResolveSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListJobsArgs {
    /// Only jobs in this state: pending, running, completed, failed, cancelled.
    #[serde(default)]
    pub status_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobIdArgs {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WaitForJobArgs {
    pub job_id: String,
    /// Give up after this many seconds. The job stays tracked.
    #[serde(default = "default_wait_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TagFileArgs {
    /// Fabric path of the file.
    pub path: String,
    /// Tags to set. Bare names get the configured namespace.
    #[serde(default)]
    pub tags: TagMap,
    /// Local copy of the file; when given, content tags are computed too.
    #[serde(default)]
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListObjectivesArgs {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemoveObjectiveArgs {
    pub objective_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckAlignmentArgs {
    pub tag_name: String,
    pub tag_value: String,
    pub objective_type: String,
    #[serde(default)]
    pub tier_name: Option<String>,
    #[serde(default = "default_alignment_files")]
    pub max_files_to_check: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckFileAlignmentArgs {
    #[serde(alias = "path")]
    pub file_path: String,
    pub objective_type: String,
    #[serde(default)]
    pub tier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TagDirectoryArgs {
    /// Directory whose files, at any depth, get the tag.
    pub path: String,
    /// e.g. `user.modelsetid`. Bare names get the configured namespace.
    pub tag_name: String,
    pub tag_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestNewFilesArgs {
    /// Directory to look for new files under, recursively.
    pub path: String,
    pub tag_name: String,
    pub tag_value: String,
    /// Files changed within this many minutes count as new.
    #[serde(default = "default_ingest_age")]
    pub age_minutes: u64,
    /// Compare modification time rather than creation time.
    #[serde(default = "default_true")]
    pub use_mtime: bool,
    /// Objective applied to the tagged files.
    #[serde(default = "default_ingest_objective")]
    pub objective_type: String,
    #[serde(default = "default_ingest_tier")]
    pub tier_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchCatalogArgs {
    /// Free text, prefix-matched against names and paths.
    #[serde(default)]
    pub query: Option<String>,
    /// node, storage_volume, object_storage_volume, share, or file.
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub share_uuid: Option<String>,
    #[serde(default)]
    pub volume_uuid: Option<String>,
    #[serde(default)]
    pub node_uuid: Option<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Exact tag matches, all required.
    #[serde(default)]
    pub tags: TagMap,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: Option<String>,
    /// asc or desc.
    #[serde(default)]
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncCatalogArgs {
    /// `full` or `incremental`.
    #[serde(default = "default_sync_mode")]
    pub mode: String,
    /// RFC 3339 timestamp for incremental syncs.
    #[serde(default)]
    pub since: Option<String>,
}

impl Default for SyncCatalogArgs {
    fn default() -> Self {
        Self {
            mode: default_sync_mode(),
            since: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IngestEventsArgs {
    #[serde(default = "default_event_limit")]
    pub limit: usize,
}

impl Default for IngestEventsArgs {
    fn default() -> Self {
        Self {
            limit: default_event_limit(),
        }
    }
}

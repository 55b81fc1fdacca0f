//! Protocol tool surface.
//!
//! Every operation exposed to tool-calling clients is a [`ToolCall`] variant
//! with a typed argument struct. [`ToolRegistry`] maps tool names to their
//! JSON schema and argument parser; it is built once and looked up by name.

pub mod args;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, TierflowError};
use args::*;

/// One parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SearchFilesByTag(SearchFilesByTagArgs),
    ApplyObjectiveToFiles(ApplyObjectiveToFilesArgs),
    ApplyObjectiveByTag(ApplyObjectiveByTagArgs),
    ListJobs(ListJobsArgs),
    GetJobStatus(JobIdArgs),
    WaitForJob(WaitForJobArgs),
    GetSystemStatus(NoArgs),
    ListShares(NoArgs),
    ListFiles(ListFilesArgs),
    GetFileTags(PathArgs),
    TagFile(TagFileArgs),
    ListObjectives(ListObjectivesArgs),
    RemoveObjective(RemoveObjectiveArgs),
    CheckTaggedFilesAlignment(CheckAlignmentArgs),
    CheckFileAlignment(CheckFileAlignmentArgs),
    TagDirectoryRecursive(TagDirectoryArgs),
    IngestNewFiles(IngestNewFilesArgs),
    SearchCatalog(SearchCatalogArgs),
    SyncCatalog(SyncCatalogArgs),
    GetCatalogHealth(NoArgs),
    GetCatalogOverview(NoArgs),
    BackupCatalog(PathArgs),
    RestoreCatalog(PathArgs),
    GetFileMonitorStatus(NoArgs),
    GetFileIngestEvents(IngestEventsArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchFilesByTag(_) => "search_files_by_tag",
            ToolCall::ApplyObjectiveToFiles(_) => "apply_objective_to_files",
            ToolCall::ApplyObjectiveByTag(_) => "apply_objective_by_tag",
            ToolCall::ListJobs(_) => "list_jobs",
            ToolCall::GetJobStatus(_) => "get_job_status",
            ToolCall::WaitForJob(_) => "wait_for_job",
            ToolCall::GetSystemStatus(_) => "get_system_status",
            ToolCall::ListShares(_) => "list_shares",
            ToolCall::ListFiles(_) => "list_files",
            ToolCall::GetFileTags(_) => "get_file_tags",
            ToolCall::TagFile(_) => "tag_file",
            ToolCall::ListObjectives(_) => "list_objectives",
            ToolCall::RemoveObjective(_) => "remove_objective",
            ToolCall::CheckTaggedFilesAlignment(_) => "check_tagged_files_alignment",
            ToolCall::CheckFileAlignment(_) => "check_file_alignment",
            ToolCall::TagDirectoryRecursive(_) => "tag_directory_recursive",
            ToolCall::IngestNewFiles(_) => "ingest_new_files",
            ToolCall::SearchCatalog(_) => "search_catalog",
            ToolCall::SyncCatalog(_) => "sync_catalog",
            ToolCall::GetCatalogHealth(_) => "get_catalog_health",
            ToolCall::GetCatalogOverview(_) => "get_catalog_overview",
            ToolCall::BackupCatalog(_) => "backup_catalog",
            ToolCall::RestoreCatalog(_) => "restore_catalog",
            ToolCall::GetFileMonitorStatus(_) => "get_file_monitor_status",
            ToolCall::GetFileIngestEvents(_) => "get_file_ingest_events",
        }
    }
}

/// Published description of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct ToolSpec {
    description: &'static str,
    schema: Value,
    parse: fn(Value) -> Result<ToolCall>,
}

fn schema_of<A: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(A)).unwrap_or_default()
}

fn decode<A: DeserializeOwned>(tool: &str, args: Value) -> Result<A> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| TierflowError::invalid_params(format!("invalid arguments for {}: {}", tool, e)))
}

macro_rules! register {
    ($tools:ident, $name:literal, $variant:ident, $args:ty, $description:literal) => {
        $tools.insert(
            $name,
            ToolSpec {
                description: $description,
                schema: schema_of::<$args>(),
                parse: |args| decode::<$args>($name, args).map(ToolCall::$variant),
            },
        );
    };
}

/// Name-indexed table of every tool.
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools = HashMap::new();
        register!(tools, "search_files_by_tag", SearchFilesByTag, SearchFilesByTagArgs,
            "Find files whose tag equals a value, from the catalog or a live fabric search");
        register!(tools, "apply_objective_to_files", ApplyObjectiveToFiles, ApplyObjectiveToFilesArgs,
            "Apply a placement objective to each listed file and track the resulting jobs");
        register!(tools, "apply_objective_by_tag", ApplyObjectiveByTag, ApplyObjectiveByTagArgs,
            "Apply a placement objective to every file carrying a tag");
        register!(tools, "list_jobs", ListJobs, ListJobsArgs,
            "List tracked data-movement jobs, refreshing unfinished ones");
        register!(tools, "get_job_status", GetJobStatus, JobIdArgs,
            "Current status of one tracked job");
        register!(tools, "wait_for_job", WaitForJob, WaitForJobArgs,
            "Wait until a tracked job completes, fails, or is cancelled");
        register!(tools, "get_system_status", GetSystemStatus, NoArgs,
            "Fabric connection, catalog health, monitors, and job counts");
        register!(tools, "list_shares", ListShares, NoArgs,
            "List shares on the fabric");
        register!(tools, "list_files", ListFiles, ListFilesArgs,
            "List files under a fabric path");
        register!(tools, "get_file_tags", GetFileTags, PathArgs,
            "Read the tags of one file");
        register!(tools, "tag_file", TagFile, TagFileArgs,
            "Set tags on one file in a single write");
        register!(tools, "list_objectives", ListObjectives, ListObjectivesArgs,
            "List objectives registered on the fabric");
        register!(tools, "remove_objective", RemoveObjective, RemoveObjectiveArgs,
            "Remove an objective from the fabric");
        register!(tools, "check_tagged_files_alignment", CheckTaggedFilesAlignment, CheckAlignmentArgs,
            "Report which tagged files already carry an objective, without changing anything");
        register!(tools, "check_file_alignment", CheckFileAlignment, CheckFileAlignmentArgs,
            "Report whether one file already carries an objective");
        register!(tools, "tag_directory_recursive", TagDirectoryRecursive, TagDirectoryArgs,
            "Set one tag on every file under a directory");
        register!(tools, "ingest_new_files", IngestNewFiles, IngestNewFilesArgs,
            "Tag files changed in the last few minutes and apply a placement objective to them");
        register!(tools, "search_catalog", SearchCatalog, SearchCatalogArgs,
            "Search the local catalog by text, kind, owner, and tags");
        register!(tools, "sync_catalog", SyncCatalog, SyncCatalogArgs,
            "Refresh the local catalog from the fabric");
        register!(tools, "get_catalog_health", GetCatalogHealth, NoArgs,
            "Item counts, staleness, and integrity of the catalog");
        register!(tools, "get_catalog_overview", GetCatalogOverview, NoArgs,
            "Per-kind catalog counts and sync state");
        register!(tools, "backup_catalog", BackupCatalog, PathArgs,
            "Write a consistent copy of the catalog to a path");
        register!(tools, "restore_catalog", RestoreCatalog, PathArgs,
            "Replace the catalog with a backup");
        register!(tools, "get_file_monitor_status", GetFileMonitorStatus, NoArgs,
            "State and counters of each share monitor");
        register!(tools, "get_file_ingest_events", GetFileIngestEvents, IngestEventsArgs,
            "Recently tagged files, newest first");
        Self { tools }
    }

    /// Parse a call to `name` with JSON `args`.
    pub fn parse(&self, name: &str, args: Value) -> Result<ToolCall> {
        let spec = self
            .tools
            .get(name)
            .ok_or_else(|| TierflowError::invalid_params(format!("unknown tool: {}", name)))?;
        (spec.parse)(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<ToolDescriptor> = self
            .tools
            .iter()
            .map(|(name, spec)| ToolDescriptor {
                name: *name,
                description: spec.description,
                input_schema: spec.schema.clone(),
            })
            .collect();
        list.sort_by_key(|d| d.name);
        list
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_variant_is_registered() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), 25);
        for descriptor in registry.list() {
            assert!(descriptor.input_schema.is_object(), "{} has no schema", descriptor.name);
        }
    }

    #[test]
    fn test_parse_round_trips_the_name() {
        let registry = ToolRegistry::new();
        let call = registry
            .parse(
                "apply_objective_to_files",
                json!({"file_paths": ["/a", "/b"], "objective_type": "place_on_tier", "tier_name": "tier0"}),
            )
            .unwrap();
        assert_eq!(call.name(), "apply_objective_to_files");
        match call {
            ToolCall::ApplyObjectiveToFiles(args) => assert_eq!(args.file_paths.len(), 2),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_defaults_and_null_args() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.parse("get_system_status", Value::Null).unwrap(),
            ToolCall::GetSystemStatus(NoArgs {})
        );
        match registry.parse("wait_for_job", json!({"job_id": "j"})).unwrap() {
            ToolCall::WaitForJob(args) => assert_eq!(args.timeout_secs, 300),
            other => panic!("unexpected call {:?}", other),
        }
        match registry
            .parse("check_tagged_files_alignment", json!({"tag_name": "k", "tag_value": "v", "objective_type": "archive"}))
            .unwrap()
        {
            ToolCall::CheckTaggedFilesAlignment(args) => assert_eq!(args.max_files_to_check, 50),
            other => panic!("unexpected call {:?}", other),
        }
        match registry
            .parse("ingest_new_files", json!({"path": "/hub/in", "tag_name": "batch", "tag_value": "7"}))
            .unwrap()
        {
            ToolCall::IngestNewFiles(args) => {
                assert_eq!(args.age_minutes, 60);
                assert!(args.use_mtime);
                assert_eq!(args.objective_type, "place_on_tier");
                assert_eq!(args.tier_name.as_deref(), Some("tier1"));
            }
            other => panic!("unexpected call {:?}", other),
        }
        match registry
            .parse("check_file_alignment", json!({"path": "/hub/a", "objective_type": "archive"}))
            .unwrap()
        {
            ToolCall::CheckFileAlignment(args) => assert_eq!(args.file_path, "/hub/a"),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tool_and_bad_args_are_invalid_params() {
        let registry = ToolRegistry::new();
        let err = registry.parse("format_disk", json!({})).unwrap_err();
        assert!(matches!(err, TierflowError::InvalidParams { .. }));

        let err = registry.parse("search_files_by_tag", json!({"tag_name": 7})).unwrap_err();
        assert!(matches!(err, TierflowError::InvalidParams { .. }));
        assert!(err.to_string().contains("search_files_by_tag"));
    }
}

//! Executes parsed tool calls and shapes their responses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::api::responses::ObjectiveRemovedResponse;
use crate::error::{Result, TierflowError};
use crate::models::ApiResponse;
use crate::tools::{ToolCall, ToolDescriptor};
use crate::TierflowApi;

fn respond<T: Serialize>(message: impl Into<String>, data: T) -> Result<Value> {
    Ok(serde_json::to_value(ApiResponse::success(message, data))?)
}

fn outcome<T: Serialize>(success: bool, message: impl Into<String>, data: T) -> Result<Value> {
    Ok(serde_json::to_value(ApiResponse::with_outcome(success, message, data))?)
}

fn parse_since(since: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| TierflowError::invalid_params(format!("invalid 'since' timestamp: {}", e)))
        })
        .transpose()
}

impl TierflowApi {
    /// Published descriptions of every tool.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.state.registry.list()
    }

    /// Parse a call to tool `name`.
    pub fn parse_tool(&self, name: &str, args: Value) -> Result<ToolCall> {
        self.state.registry.parse(name, args)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.state.registry.contains(name)
    }

    /// Execute a tool call. Failures become a response with
    /// `success: false` and the error class.
    pub async fn execute(&self, call: ToolCall) -> Value {
        let tool = call.name();
        match self.try_execute(call).await {
            Ok(value) => value,
            Err(e) => {
                warn_failure(tool, &e);
                serde_json::to_value(ApiResponse::<()>::from_error(&e))
                    .unwrap_or_else(|_| serde_json::json!({"success": false, "message": e.to_string()}))
            }
        }
    }

    /// Execute a tool call, returning failures as errors.
    pub async fn try_execute(&self, call: ToolCall) -> Result<Value> {
        match call {
            ToolCall::SearchFilesByTag(args) => {
                let found = self
                    .search_files_by_tag(&args.tag_name, &args.tag_value, args.source)
                    .await?;
                let message = format!(
                    "Found {} file(s) tagged {}={}",
                    found.total_count, args.tag_name, args.tag_value
                );
                respond(message, found)
            }
            ToolCall::ApplyObjectiveToFiles(args) => {
                let result = self
                    .apply_objective_to_files(&args.file_paths, &args.objective_type, args.tier_name)
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            ToolCall::ApplyObjectiveByTag(args) => {
                let result = self
                    .apply_objective_by_tag(
                        &args.tag_name,
                        &args.tag_value,
                        &args.objective_type,
                        args.tier_name,
                        args.source,
                    )
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            ToolCall::ListJobs(args) => {
                let jobs = self.list_jobs(args.status_filter.as_deref()).await?;
                respond(format!("{} job(s)", jobs.total), jobs)
            }
            ToolCall::GetJobStatus(args) => {
                let status = self.get_job_status(&args.job_id).await?;
                respond(format!("Job {} is {}", status.job_id, status.state), status)
            }
            ToolCall::WaitForJob(args) => {
                let status = self
                    .wait_for_job(&args.job_id, Duration::from_secs(args.timeout_secs))
                    .await?;
                let succeeded = status.state == crate::models::JobState::Completed;
                outcome(succeeded, format!("Job {} finished: {}", status.job_id, status.state), status)
            }
            ToolCall::GetSystemStatus(_) => {
                let status = self.get_system_status().await?;
                respond("System status", status)
            }
            ToolCall::ListShares(_) => {
                let shares = self.list_shares().await?;
                respond(format!("{} share(s)", shares.total), shares)
            }
            ToolCall::ListFiles(args) => {
                let files = self.list_files(&args.path, args.recursive).await?;
                respond(format!("{} file(s) under {}", files.total, files.path), files)
            }
            ToolCall::GetFileTags(args) => {
                let tags = self.get_file_tags(&args.path).await?;
                respond(format!("{} tag(s) on {}", tags.tags.len(), tags.path), tags)
            }
            ToolCall::TagFile(args) => {
                let result = self
                    .tag_file(&args.path, &args.tags, args.local_path.as_deref())
                    .await?;
                let message = if result.changed {
                    format!("Tagged {}", result.fabric_path)
                } else {
                    format!("{} already up to date", result.fabric_path)
                };
                respond(message, result)
            }
            ToolCall::ListObjectives(args) => {
                let objectives = self.list_objectives(args.path.as_deref()).await?;
                respond(format!("{} objective(s)", objectives.total), objectives)
            }
            ToolCall::RemoveObjective(args) => {
                self.remove_objective(&args.objective_uuid).await?;
                respond(
                    format!("Removed objective {}", args.objective_uuid),
                    ObjectiveRemovedResponse {
                        objective_uuid: args.objective_uuid,
                    },
                )
            }
            ToolCall::CheckTaggedFilesAlignment(args) => {
                let report = self
                    .check_tagged_files_alignment(
                        &args.tag_name,
                        &args.tag_value,
                        &args.objective_type,
                        args.tier_name,
                        args.max_files_to_check,
                    )
                    .await?;
                Ok(serde_json::to_value(report)?)
            }
            ToolCall::CheckFileAlignment(args) => {
                let alignment = self
                    .check_file_alignment(&args.file_path, &args.objective_type, args.tier_name)
                    .await?;
                let message = format!(
                    "{} is {}",
                    alignment.file_path,
                    if alignment.aligned { "aligned" } else { "misaligned" }
                );
                respond(message, alignment)
            }
            ToolCall::TagDirectoryRecursive(args) => {
                let report = self
                    .tag_directory_recursive(&args.path, &args.tag_name, &args.tag_value)
                    .await?;
                let message = format!(
                    "Tagged {} of {} file(s) under {} with {}={}",
                    report.tagged + report.unchanged,
                    report.files_found,
                    report.path,
                    report.tag_name,
                    report.tag_value
                );
                outcome(report.failures.is_empty(), message, report)
            }
            ToolCall::IngestNewFiles(args) => {
                let report = self.ingest_new_files(&args).await?;
                let placed = report.placement.as_ref().map_or(0, |p| p.accepted);
                let message = if report.files_found == 0 {
                    format!("No new files in the last {} minute(s)", report.age_minutes)
                } else {
                    format!(
                        "Ingested {} new file(s): {} tagged, {} placed",
                        report.files_found, report.files_tagged, placed
                    )
                };
                let succeeded = report.tag_failures.is_empty()
                    && report.placement.as_ref().map_or(true, |p| p.rejected == 0);
                outcome(succeeded, message, report)
            }
            ToolCall::SearchCatalog(args) => {
                let page = self.search_catalog(args.to_query()?).await?;
                respond(
                    format!("{} of {} catalog entries", page.entries.len(), page.total_count),
                    page,
                )
            }
            ToolCall::SyncCatalog(args) => {
                let mode = args.mode.parse()?;
                let since = parse_since(args.since.as_deref())?;
                let report = self.sync_catalog(mode, since).await?;
                Ok(serde_json::to_value(report)?)
            }
            ToolCall::GetCatalogHealth(_) => {
                let health = self.get_catalog_health().await?;
                let message = if health.healthy {
                    "Catalog healthy".to_string()
                } else {
                    format!("Catalog unhealthy: {}", health.issues.join("; "))
                };
                respond(message, health)
            }
            ToolCall::GetCatalogOverview(_) => {
                let overview = self.get_catalog_overview().await?;
                respond(format!("{} catalog entries", overview.total_items), overview)
            }
            ToolCall::BackupCatalog(args) => {
                let backup = self.backup_catalog(&args.path).await?;
                respond(format!("Catalog backed up to {}", backup.backup_path), backup)
            }
            ToolCall::RestoreCatalog(args) => {
                let restored = self.restore_catalog(&args.path).await?;
                respond(
                    format!("Restored {} entries from {}", restored.total_items, restored.restored_from),
                    restored,
                )
            }
            ToolCall::GetFileMonitorStatus(_) => {
                let monitors = self.get_file_monitor_status();
                respond(format!("{} monitor(s)", monitors.monitors.len()), monitors)
            }
            ToolCall::GetFileIngestEvents(args) => {
                let events = self.get_file_ingest_events(args.limit);
                respond(format!("{} recent event(s)", events.events.len()), events)
            }
        }
    }
}

fn warn_failure(tool: &str, err: &TierflowError) {
    match err {
        TierflowError::InvalidParams { .. } | TierflowError::NotFound { .. } => {
            tracing::debug!(tool, error = %err, "Tool call failed")
        }
        _ => tracing::warn!(tool, error = %err, "Tool call failed"),
    }
}

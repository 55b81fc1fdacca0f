//! Objective application and job tracking.

use std::time::Duration;

use crate::api::responses::{JobListResponse, ObjectiveListResponse};
use crate::error::Result;
use crate::models::{JobState, JobStatus, ObjectiveType};
use crate::orchestrator::{AlignmentReport, BatchResult, FileAlignment, ResolveSource};
use crate::TierflowApi;

impl TierflowApi {
    pub async fn apply_objective_to_files(
        &self,
        file_paths: &[String],
        objective_type: &str,
        tier_name: Option<String>,
    ) -> Result<BatchResult> {
        let objective_type: ObjectiveType = objective_type.parse()?;
        self.state
            .orchestrator
            .apply_objective_to_files(file_paths, objective_type, tier_name)
            .await
    }

    pub async fn apply_objective_by_tag(
        &self,
        tag_name: &str,
        tag_value: &str,
        objective_type: &str,
        tier_name: Option<String>,
        source: ResolveSource,
    ) -> Result<BatchResult> {
        let objective_type: ObjectiveType = objective_type.parse()?;
        self.state
            .orchestrator
            .apply_objective_by_tag(tag_name, tag_value, objective_type, tier_name, source)
            .await
    }

    pub async fn check_tagged_files_alignment(
        &self,
        tag_name: &str,
        tag_value: &str,
        objective_type: &str,
        tier_name: Option<String>,
        max_files_to_check: usize,
    ) -> Result<AlignmentReport> {
        let objective_type: ObjectiveType = objective_type.parse()?;
        self.state
            .orchestrator
            .check_alignment(tag_name, tag_value, objective_type, tier_name, max_files_to_check)
            .await
    }

    pub async fn check_file_alignment(
        &self,
        file_path: &str,
        objective_type: &str,
        tier_name: Option<String>,
    ) -> Result<FileAlignment> {
        let objective_type: ObjectiveType = objective_type.parse()?;
        self.state
            .orchestrator
            .check_file_alignment(file_path, objective_type, tier_name)
            .await
    }

    pub async fn list_objectives(&self, path: Option<&str>) -> Result<ObjectiveListResponse> {
        let objectives = self.state.orchestrator.list_objectives(path).await?;
        Ok(ObjectiveListResponse {
            total: objectives.len(),
            objectives,
        })
    }

    pub async fn remove_objective(&self, objective_uuid: &str) -> Result<()> {
        self.state.orchestrator.remove_objective(objective_uuid).await
    }

    /// Tracked jobs after refreshing unfinished ones.
    pub async fn list_jobs(&self, status_filter: Option<&str>) -> Result<JobListResponse> {
        let filter = status_filter
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<JobState>)
            .transpose()?;
        self.state.tracker.refresh().await;
        let jobs = self.state.tracker.list_all(filter);
        Ok(JobListResponse {
            total: jobs.len(),
            jobs,
        })
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        self.state.tracker.status(job_id).await
    }

    /// Track `job_id` if needed and wait for it to finish.
    pub async fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Result<JobStatus> {
        self.state.tracker.track(job_id);
        self.state.tracker.wait_until_terminal(job_id, timeout).await
    }
}

//! Shares, files, and tags.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

use crate::api::responses::{
    DirectoryTagResponse, FileListResponse, FileSearchResponse, FileTagsResponse, IngestResponse,
    ShareListResponse,
};
use crate::error::{Result, TierflowError};
use crate::models::{FileEntry, ObjectiveRequest, ObjectiveType, TagMap};
use crate::orchestrator::{Rejection, ResolveSource};
use crate::tagging::{TagResult, TagTarget};
use crate::tools::args::IngestNewFilesArgs;
use crate::TierflowApi;

/// Ingest responses list at most this many paths.
const INGEST_LISTED_FILES: usize = 10;

fn file_time(file: &FileEntry, use_mtime: bool) -> Option<DateTime<Utc>> {
    let raw = if use_mtime {
        file.meta.modified.as_deref()
    } else {
        file.meta.created.as_deref()
    }?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl TierflowApi {
    /// Files whose tag `tag_name` equals `tag_value`.
    pub async fn search_files_by_tag(
        &self,
        tag_name: &str,
        tag_value: &str,
        source: ResolveSource,
    ) -> Result<FileSearchResponse> {
        let resolved = self
            .state
            .orchestrator
            .resolve(tag_name, tag_value, source)
            .await?;
        Ok(FileSearchResponse {
            total_count: resolved.files.len(),
            matching_files: resolved.files,
            source: resolved.source,
        })
    }

    pub async fn list_shares(&self) -> Result<ShareListResponse> {
        let shares = self.state.gateway.list_shares().await?;
        Ok(ShareListResponse {
            total: shares.len(),
            shares,
        })
    }

    pub async fn list_files(&self, path: &str, recursive: bool) -> Result<FileListResponse> {
        let files = self.state.gateway.list_files(path, recursive).await?;
        Ok(FileListResponse {
            path: path.to_string(),
            total: files.len(),
            files,
        })
    }

    pub async fn get_file_tags(&self, path: &str) -> Result<FileTagsResponse> {
        let tags = self.state.gateway.get_file_tags(path).await?;
        Ok(FileTagsResponse {
            path: path.to_string(),
            tags,
        })
    }

    /// Set `tags` on the fabric file at `path` in one write.
    ///
    /// With `local_path`, the file's content tags are computed from the
    /// local copy and written together with `tags`.
    pub async fn tag_file(&self, path: &str, tags: &TagMap, local_path: Option<&str>) -> Result<TagResult> {
        if path.trim().is_empty() {
            return Err(TierflowError::invalid_params("path must not be empty"));
        }
        match local_path {
            Some(local) => {
                let target = TagTarget::new(PathBuf::from(local), path);
                self.state.engine.tag_file(&target, tags).await
            }
            None => self.state.engine.apply_tags(path, tags).await,
        }
    }

    /// Set `tag_name = tag_value` on every regular file under `path`.
    pub async fn tag_directory_recursive(
        &self,
        path: &str,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<DirectoryTagResponse> {
        if path.trim().is_empty() || tag_name.trim().is_empty() {
            return Err(TierflowError::invalid_params("path and tag_name must not be empty"));
        }
        let paths: Vec<String> = self
            .state
            .gateway
            .list_files(path, true)
            .await?
            .into_iter()
            .filter(|f| !f.is_directory)
            .map(|f| f.path)
            .collect();
        let files_found = paths.len();
        let (carrying, unchanged, failures) = self.tag_all(paths, tag_name, tag_value).await;
        let tagged = carrying.len() - unchanged;

        info!(path, files_found, tagged, failed = failures.len(), "Tagged directory");
        Ok(DirectoryTagResponse {
            path: path.to_string(),
            tag_name: tag_name.to_string(),
            tag_value: tag_value.to_string(),
            files_found,
            tagged,
            unchanged,
            failures,
        })
    }

    /// Tag the files under `args.path` changed within `args.age_minutes`,
    /// then apply the ingest objective to every file that took the tag.
    pub async fn ingest_new_files(&self, args: &IngestNewFilesArgs) -> Result<IngestResponse> {
        if args.path.trim().is_empty() || args.tag_name.trim().is_empty() {
            return Err(TierflowError::invalid_params("path and tag_name must not be empty"));
        }
        let objective_type: ObjectiveType = args.objective_type.parse()?;
        ObjectiveRequest::new(objective_type.clone(), args.path.as_str(), args.tier_name.clone())
            .validate()?;

        let max_age = std::time::Duration::from_secs(args.age_minutes.saturating_mul(60));
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let new_files: Vec<String> = self
            .state
            .gateway
            .list_files(&args.path, true)
            .await?
            .into_iter()
            .filter(|f| !f.is_directory)
            .filter(|f| file_time(f, args.use_mtime).is_some_and(|t| t >= cutoff))
            .map(|f| f.path)
            .collect();

        let mut response = IngestResponse {
            path: args.path.clone(),
            age_minutes: args.age_minutes,
            time_type: if args.use_mtime { "mtime" } else { "ctime" }.to_string(),
            files_found: new_files.len(),
            files_tagged: 0,
            new_files: new_files.iter().take(INGEST_LISTED_FILES).cloned().collect(),
            tag_applied: format!("{}={}", args.tag_name, args.tag_value),
            tag_failures: Vec::new(),
            placement: None,
        };
        if new_files.is_empty() {
            return Ok(response);
        }

        let (tagged, _, failures) = self.tag_all(new_files, &args.tag_name, &args.tag_value).await;
        response.files_tagged = tagged.len();
        response.tag_failures = failures;
        if !tagged.is_empty() {
            let placement = self
                .state
                .orchestrator
                .apply_objective_to_files(&tagged, objective_type, args.tier_name.clone())
                .await?;
            response.placement = Some(placement);
        }
        info!(
            path = %args.path,
            found = response.files_found,
            tagged = response.files_tagged,
            "Ingested new files"
        );
        Ok(response)
    }

    /// Returns every path that now carries the tag, the count already
    /// carrying it, and the per-file failures.
    async fn tag_all(
        &self,
        paths: Vec<String>,
        tag_name: &str,
        tag_value: &str,
    ) -> (Vec<String>, usize, Vec<Rejection>) {
        let tags = TagMap::from([(tag_name.to_string(), tag_value.to_string())]);
        let concurrency = self.state.config.orchestrator.submit_concurrency;
        let mut carrying = Vec::new();
        let mut unchanged = 0;
        let mut failures = Vec::new();
        for (path, result) in self.state.engine.apply_tags_to_all(paths, &tags, concurrency).await {
            match result {
                Ok(result) => {
                    if !result.changed {
                        unchanged += 1;
                    }
                    carrying.push(path);
                }
                Err(e) => failures.push(Rejection {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
        (carrying, unchanged, failures)
    }
}

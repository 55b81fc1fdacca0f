//! REST implementation of [`StorageGateway`].
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation                 | Request                                   |
//! |---------------------------|-------------------------------------------|
//! | list nodes / volumes      | `GET nodes`, `storage-volumes`, `object-storage-volumes` |
//! | list shares               | `GET shares`                              |
//! | list files                | `GET files?path=&recursive=`              |
//! | search by tag             | `GET files/search?tag=&value=`            |
//! | get / set tags            | `GET files/tags?path=`, `PUT files/tags`  |
//! | objectives                | `GET objectives?path=`, `POST objectives`, `DELETE objectives/{uuid}` |
//! | job status                | `GET tasks/{uuid}`                        |

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use super::{wire, StorageGateway};
use crate::config::FabricConfig;
use crate::error::{Result, TierflowError};
use crate::models::{
    FileEntry, JobStatus, Node, ObjectStorageVolume, Objective, ObjectiveRequest,
    ObjectiveSubmission, Share, StorageVolume, TagMap,
};
use crate::network::{FabricClient, RequestStats};

/// Gateway backed by the fabric's HTTP management API.
pub struct HttpGateway {
    client: FabricClient,
}

impl HttpGateway {
    pub fn new(config: &FabricConfig) -> Result<Self> {
        Ok(Self {
            client: FabricClient::new(config)?,
        })
    }

    async fn list<T>(&self, segments: &[&str], decode: fn(Value) -> Result<T>) -> Result<Vec<T>> {
        self.list_with_query(segments, &[], decode).await
    }

    async fn list_with_query<T>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        decode: fn(Value) -> Result<T>,
    ) -> Result<Vec<T>> {
        let body: Value = self.client.get_json(segments, query).await?;
        let items = wire::list_items(body)?;
        let total = items.len();

        let mut decoded = Vec::with_capacity(total);
        for item in items {
            match decode(item) {
                Ok(value) => decoded.push(value),
                Err(e) => debug!(endpoint = segments.join("/"), error = %e, "Skipping undecodable item"),
            }
        }
        if decoded.len() < total {
            debug!(
                endpoint = segments.join("/"),
                skipped = total - decoded.len(),
                "Some fabric items could not be decoded"
            );
        }
        Ok(decoded)
    }
}

#[async_trait]
impl StorageGateway for HttpGateway {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list(&["nodes"], wire::node).await
    }

    async fn list_storage_volumes(&self) -> Result<Vec<StorageVolume>> {
        self.list(&["storage-volumes"], wire::storage_volume).await
    }

    async fn list_object_storage_volumes(&self) -> Result<Vec<ObjectStorageVolume>> {
        self.list(&["object-storage-volumes"], wire::object_storage_volume)
            .await
    }

    async fn list_shares(&self) -> Result<Vec<Share>> {
        self.list(&["shares"], wire::share).await
    }

    async fn list_files(&self, path: &str, recursive: bool) -> Result<Vec<FileEntry>> {
        let query = [("path", path.to_string()), ("recursive", recursive.to_string())];
        self.list_with_query(&["files"], &query, wire::file).await
    }

    async fn search_files_by_tag(&self, key: &str, value: &str) -> Result<Vec<FileEntry>> {
        let query = [("tag", key.to_string()), ("value", value.to_string())];
        self.list_with_query(&["files", "search"], &query, wire::file)
            .await
    }

    async fn get_file_tags(&self, path: &str) -> Result<TagMap> {
        let body: Value = self
            .client
            .get_json(&["files", "tags"], &[("path", path.to_string())])
            .await
            .map_err(|e| match e {
                TierflowError::NotFound { .. } => TierflowError::not_found(format!("file {}", path)),
                other => other,
            })?;
        Ok(wire::tag_map(body))
    }

    async fn set_file_tags(&self, path: &str, tags: &TagMap) -> Result<()> {
        let body = json!({ "path": path, "tags": tags });
        let _: Value = self
            .client
            .send_json(Method::PUT, &["files", "tags"], Some(&body))
            .await
            .map_err(|e| match e {
                TierflowError::NotFound { .. } => TierflowError::not_found(format!("file {}", path)),
                other => other,
            })?;
        Ok(())
    }

    async fn create_objective(&self, request: &ObjectiveRequest) -> Result<ObjectiveSubmission> {
        request.validate()?;
        let body = json!({
            "objectiveType": request.objective_type.as_str(),
            "path": request.path,
            "tierName": request.tier_name,
            "parameters": request.parameters,
        });
        let response: Value = self
            .client
            .send_json(Method::POST, &["objectives"], Some(&body))
            .await?;
        wire::submission(response)
    }

    async fn list_objectives(&self, path: Option<&str>) -> Result<Vec<Objective>> {
        let query: Vec<(&str, String)> = path.map(|p| ("path", p.to_string())).into_iter().collect();
        self.list_with_query(&["objectives"], &query, wire::objective)
            .await
    }

    async fn remove_objective(&self, objective_uuid: &str) -> Result<()> {
        let _: Value = self
            .client
            .send_json::<Value, _>(Method::DELETE, &["objectives", objective_uuid], None)
            .await?;
        Ok(())
    }

    async fn get_job_status(&self, job_uuid: &str) -> Result<JobStatus> {
        let body: Value = self
            .client
            .get_json(&["tasks", job_uuid], &[])
            .await
            .map_err(|e| match e {
                TierflowError::NotFound { .. } => TierflowError::not_found(format!("job {}", job_uuid)),
                other => other,
            })?;
        wire::job_status(body, job_uuid)
    }

    fn describe(&self) -> String {
        self.client.base_url().to_string()
    }

    fn stats(&self) -> RequestStats {
        self.client.stats()
    }
}

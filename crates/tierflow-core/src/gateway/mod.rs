//! Typed access to the remote storage fabric.
//!
//! Every component talks to the fabric through [`StorageGateway`]. The
//! production implementation is [`HttpGateway`]; [`InMemoryGateway`] is an
//! in-process fabric used by tests and offline runs.

mod http;
mod memory;
pub(crate) mod wire;

pub use http::HttpGateway;
pub use memory::{GatewayOp, InMemoryGateway};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    FileEntry, JobStatus, Node, ObjectStorageVolume, Objective, ObjectiveRequest,
    ObjectiveSubmission, Share, StorageVolume, TagMap,
};
use crate::network::RequestStats;

/// Operations the pipeline needs from the fabric.
///
/// Errors follow the library taxonomy: `Authentication` for rejected
/// credentials, `NotFound` for missing targets, `Api` for everything else.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_storage_volumes(&self) -> Result<Vec<StorageVolume>>;

    async fn list_object_storage_volumes(&self) -> Result<Vec<ObjectStorageVolume>>;

    async fn list_shares(&self) -> Result<Vec<Share>>;

    /// List files under a fabric path.
    async fn list_files(&self, path: &str, recursive: bool) -> Result<Vec<FileEntry>>;

    /// Live search for files carrying `key = value`.
    async fn search_files_by_tag(&self, key: &str, value: &str) -> Result<Vec<FileEntry>>;

    /// Current tags of one file. An untagged file yields an empty map.
    async fn get_file_tags(&self, path: &str) -> Result<TagMap>;

    /// Set several tags on one file in a single atomic write.
    async fn set_file_tags(&self, path: &str, tags: &TagMap) -> Result<()>;

    async fn create_objective(&self, request: &ObjectiveRequest) -> Result<ObjectiveSubmission>;

    /// Objectives registered on the fabric, optionally only those for `path`.
    async fn list_objectives(&self, path: Option<&str>) -> Result<Vec<Objective>>;

    async fn remove_objective(&self, objective_uuid: &str) -> Result<()>;

    async fn get_job_status(&self, job_uuid: &str) -> Result<JobStatus>;

    /// Human-readable description of the endpoint, for status reports.
    fn describe(&self) -> String;

    /// Request counters, when the implementation keeps them.
    fn stats(&self) -> RequestStats {
        RequestStats::default()
    }
}

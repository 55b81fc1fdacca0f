//! Domain types shared by the pipeline components.

mod api_response;
mod entity;
mod job;
mod objective;

pub use api_response::ApiResponse;
pub use entity::{
    CatalogEntry, Entity, EntityKind, EntityMeta, FileEntry, Node, ObjectStorageVolume, Share,
    StorageVolume, TagMap,
};
pub use job::{JobState, JobStatus};
pub use objective::{Objective, ObjectiveRequest, ObjectiveSubmission, ObjectiveType};

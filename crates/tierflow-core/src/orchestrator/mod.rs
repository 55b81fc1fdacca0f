//! Tag-driven objective orchestration.

mod batch;
mod tiering;

pub use batch::{
    AlignmentReport, BatchResult, FileAlignment, MatchedFile, Rejection, ResolveSource, Resolved,
};
pub use tiering::TagObjectiveOrchestrator;

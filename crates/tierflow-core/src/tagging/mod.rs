//! Content-derived file tagging.

pub mod content;
mod engine;

pub use content::ContentInfo;
pub use engine::{TagEngine, TagResult, TagTarget, TagWriteMark};

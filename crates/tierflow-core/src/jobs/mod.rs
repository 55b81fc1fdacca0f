//! Tracking of fabric data-movement jobs.

mod tracker;

pub use tracker::{JobSummary, JobTracker};

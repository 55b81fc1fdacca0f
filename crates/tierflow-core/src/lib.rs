//! Tierflow Core - Headless library for tag-driven tiering on a storage fabric.
//!
//! The pipeline has three paths:
//! - monitors hash and tag files on watched shares through the fabric gateway
//! - a periodic sync mirrors fabric entities into a local SQLite catalog
//! - the orchestrator turns a tag predicate into a batch of placement
//!   objectives and tracks the resulting data-movement jobs
//!
//! # Example
//!
//! ```rust,ignore
//! use tierflow_core::{ResolveSource, TierflowApi, TierflowConfig};
//!
//! #[tokio::main]
//! async fn main() -> tierflow_core::Result<()> {
//!     let api = TierflowApi::builder(TierflowConfig::load()?).build().await?;
//!     api.start_background().await;
//!
//!     let batch = api
//!         .apply_objective_by_tag("user.priority", "high", "place_on_tier", Some("tier0".into()), ResolveSource::Auto)
//!         .await?;
//!     println!("{} jobs submitted", batch.job_ids.len());
//!
//!     api.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod models;
pub mod monitor;
pub mod network;
pub mod orchestrator;
pub mod tagging;
pub mod tools;

mod api;

// Re-export commonly used types
pub use api::responses;
pub use api::TierflowApiBuilder;
pub use cancel::{CancellationToken, CancelledError};
pub use catalog::{CatalogQuery, CatalogStore, CatalogSyncer, HealthReport, SyncMode, SyncReport};
pub use config::{ShareMapping, TierflowConfig};
pub use error::{Result, TierflowError};
pub use gateway::{HttpGateway, InMemoryGateway, StorageGateway};
pub use jobs::{JobSummary, JobTracker};
pub use models::{JobState, JobStatus, ObjectiveType, TagMap};
pub use monitor::{FileMonitor, TagEventLog};
pub use orchestrator::{BatchResult, ResolveSource, TagObjectiveOrchestrator};
pub use tagging::{TagEngine, TagResult, TagTarget, TagWriteMark};
pub use tools::{ToolCall, ToolRegistry};

use std::sync::Arc;

use api::ApiState;

/// Library version reported by status calls.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main entry point for the tiering pipeline.
///
/// Owns the gateway, catalog, tag engine, monitors, orchestrator, and job
/// tracker. Cloning is cheap and every clone drives the same components.
#[derive(Clone)]
pub struct TierflowApi {
    state: Arc<ApiState>,
}

impl TierflowApi {
    /// Create a builder for TierflowApi.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let api = TierflowApi::builder(config)
    ///     .with_gateway(Arc::new(InMemoryGateway::new()))
    ///     .auto_create_dirs(true)
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder(config: TierflowConfig) -> TierflowApiBuilder {
        TierflowApiBuilder::new(config)
    }

    /// Create a TierflowApi talking HTTP to the configured fabric.
    pub async fn new(config: TierflowConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.state.gateway
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.state.store
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.state.tracker
    }

    pub fn tag_engine(&self) -> &Arc<TagEngine> {
        &self.state.engine
    }

    pub fn monitors(&self) -> &[Arc<FileMonitor>] {
        &self.state.monitors
    }
}

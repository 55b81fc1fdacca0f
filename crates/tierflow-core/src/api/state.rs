//! Components owned by a running API instance.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::catalog::{CatalogStore, CatalogSyncer};
use crate::config::TierflowConfig;
use crate::gateway::StorageGateway;
use crate::jobs::JobTracker;
use crate::monitor::{FileMonitor, TagEventLog};
use crate::orchestrator::TagObjectiveOrchestrator;
use crate::tagging::TagEngine;
use crate::tools::ToolRegistry;

/// Every pipeline component, wired to one gateway and one catalog.
pub(crate) struct ApiState {
    pub(crate) config: TierflowConfig,
    pub(crate) gateway: Arc<dyn StorageGateway>,
    pub(crate) store: Arc<CatalogStore>,
    pub(crate) syncer: Arc<CatalogSyncer>,
    pub(crate) engine: Arc<TagEngine>,
    pub(crate) orchestrator: TagObjectiveOrchestrator,
    pub(crate) tracker: JobTracker,
    pub(crate) events: Arc<TagEventLog>,
    pub(crate) monitors: Vec<Arc<FileMonitor>>,
    pub(crate) registry: ToolRegistry,
    /// Root token; cancelling it stops every background task.
    pub(crate) cancel: CancellationToken,
    /// Background tasks started by `start_background`. Protected by async
    /// Mutex so shutdown can await them.
    pub(crate) tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

//! In-process fabric.
//!
//! Holds entities, tags, objectives and jobs in memory. Jobs advance one
//! step per status poll, failures can be queued per operation, and every
//! call is counted so tests can assert on write amplification.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::StorageGateway;
use crate::error::{Result, TierflowError};
use crate::models::{
    FileEntry, JobState, JobStatus, Node, ObjectStorageVolume, Objective, ObjectiveRequest,
    ObjectiveSubmission, Share, StorageVolume, TagMap,
};
use crate::network::RequestStats;

/// Gateway operations, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    ListNodes,
    ListStorageVolumes,
    ListObjectStorageVolumes,
    ListShares,
    ListFiles,
    SearchFiles,
    GetTags,
    SetTags,
    CreateObjective,
    ListObjectives,
    RemoveObjective,
    GetJobStatus,
}

#[derive(Debug)]
struct ScriptedJob {
    status: JobStatus,
    polls_remaining: u32,
    outcome: JobState,
}

#[derive(Debug)]
struct FabricState {
    nodes: Vec<Node>,
    storage_volumes: Vec<StorageVolume>,
    object_storage_volumes: Vec<ObjectStorageVolume>,
    shares: Vec<Share>,
    files: BTreeMap<String, FileEntry>,
    objectives: Vec<Objective>,
    jobs: HashMap<String, ScriptedJob>,
    failures: HashMap<GatewayOp, VecDeque<TierflowError>>,
    rejected_paths: HashMap<String, String>,
    calls: HashMap<GatewayOp, u64>,
    job_polls: HashMap<String, u64>,
    polls_before_terminal: u32,
    job_outcome: JobState,
    auto_register_files: bool,
}

impl Default for FabricState {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            storage_volumes: Vec::new(),
            object_storage_volumes: Vec::new(),
            shares: Vec::new(),
            files: BTreeMap::new(),
            objectives: Vec::new(),
            jobs: HashMap::new(),
            failures: HashMap::new(),
            rejected_paths: HashMap::new(),
            calls: HashMap::new(),
            job_polls: HashMap::new(),
            polls_before_terminal: 0,
            job_outcome: JobState::Completed,
            auto_register_files: true,
        }
    }
}

impl FabricState {
    fn begin(&mut self, op: GatewayOp) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn share_for(&self, path: &str) -> Option<&Share> {
        self.shares
            .iter()
            .filter(|s| is_under(path, &s.path))
            .max_by_key(|s| s.path.len())
    }

    fn register_file(&mut self, path: &str) -> &mut FileEntry {
        let share_uuid = self.share_for(path).map(|s| s.meta.uuid.clone());
        self.files.entry(path.to_string()).or_insert_with(|| {
            let mut file = FileEntry::new(uuid::Uuid::new_v4().to_string(), path);
            file.share_uuid = share_uuid;
            file.meta.created = Some(Utc::now().to_rfc3339());
            file
        })
    }

    fn path_exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.shares.iter().any(|s| s.path == path)
    }
}

fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    root.is_empty() || path == root || path.starts_with(&format!("{}/", root))
}

/// An in-memory fabric.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<FabricState>,
}

impl InMemoryGateway {
    /// Create an empty fabric that registers unknown files on first tag access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty fabric that answers `NotFound` for unknown files.
    pub fn strict() -> Self {
        let gateway = Self::default();
        gateway.lock().auto_register_files = false;
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, FabricState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_node(&self, node: Node) {
        self.lock().nodes.push(node);
    }

    pub fn add_storage_volume(&self, volume: StorageVolume) {
        self.lock().storage_volumes.push(volume);
    }

    pub fn add_object_storage_volume(&self, volume: ObjectStorageVolume) {
        self.lock().object_storage_volumes.push(volume);
    }

    pub fn add_share(&self, share: Share) {
        self.lock().shares.push(share);
    }

    /// Insert or replace a file, keyed by path.
    pub fn add_file(&self, mut file: FileEntry) {
        let mut state = self.lock();
        if file.share_uuid.is_none() {
            file.share_uuid = state.share_for(&file.path).map(|s| s.meta.uuid.clone());
        }
        state.files.insert(file.path.clone(), file);
    }

    pub fn remove_file(&self, path: &str) -> Option<FileEntry> {
        self.lock().files.remove(path)
    }

    pub fn file(&self, path: &str) -> Option<FileEntry> {
        self.lock().files.get(path).cloned()
    }

    /// Queue an error for the next call of `op`.
    pub fn fail_next(&self, op: GatewayOp, err: TierflowError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Make objective submissions for `path` fail with `reason`.
    pub fn reject_objectives_for(&self, path: &str, reason: &str) {
        self.lock()
            .rejected_paths
            .insert(path.to_string(), reason.to_string());
    }

    /// Jobs created from now on report `running` for `polls` polls, then `outcome`.
    pub fn script_jobs(&self, polls: u32, outcome: JobState) {
        let mut state = self.lock();
        state.polls_before_terminal = polls;
        state.job_outcome = outcome;
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: GatewayOp) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of status polls made for one job.
    pub fn job_polls(&self, job_uuid: &str) -> u64 {
        self.lock().job_polls.get(job_uuid).copied().unwrap_or(0)
    }

    pub fn objectives(&self) -> Vec<Objective> {
        self.lock().objectives.clone()
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListNodes)?;
        Ok(state.nodes.clone())
    }

    async fn list_storage_volumes(&self) -> Result<Vec<StorageVolume>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListStorageVolumes)?;
        Ok(state.storage_volumes.clone())
    }

    async fn list_object_storage_volumes(&self) -> Result<Vec<ObjectStorageVolume>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListObjectStorageVolumes)?;
        Ok(state.object_storage_volumes.clone())
    }

    async fn list_shares(&self) -> Result<Vec<Share>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListShares)?;
        Ok(state.shares.clone())
    }

    async fn list_files(&self, path: &str, recursive: bool) -> Result<Vec<FileEntry>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListFiles)?;
        let root = path.trim_end_matches('/');
        Ok(state
            .files
            .values()
            .filter(|f| f.path != root && is_under(&f.path, root))
            .filter(|f| {
                recursive || !f.path[root.len()..].trim_start_matches('/').contains('/')
            })
            .cloned()
            .collect())
    }

    async fn search_files_by_tag(&self, key: &str, value: &str) -> Result<Vec<FileEntry>> {
        let mut state = self.lock();
        state.begin(GatewayOp::SearchFiles)?;
        Ok(state
            .files
            .values()
            .filter(|f| f.tags.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn get_file_tags(&self, path: &str) -> Result<TagMap> {
        let mut state = self.lock();
        state.begin(GatewayOp::GetTags)?;
        match state.files.get(path) {
            Some(file) => Ok(file.tags.clone()),
            None if state.auto_register_files => Ok(TagMap::new()),
            None => Err(TierflowError::not_found(format!("file {}", path))),
        }
    }

    async fn set_file_tags(&self, path: &str, tags: &TagMap) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayOp::SetTags)?;
        if !state.files.contains_key(path) && !state.auto_register_files {
            return Err(TierflowError::not_found(format!("file {}", path)));
        }
        let file = state.register_file(path);
        for (key, value) in tags {
            file.tags.insert(key.clone(), value.clone());
        }
        if let Some(size) = tags
            .iter()
            .find(|(k, _)| k.ends_with(".size"))
            .and_then(|(_, v)| v.parse().ok())
        {
            file.size_bytes = Some(size);
        }
        file.meta.modified = Some(Utc::now().to_rfc3339());
        Ok(())
    }

    async fn create_objective(&self, request: &ObjectiveRequest) -> Result<ObjectiveSubmission> {
        request.validate()?;
        let mut state = self.lock();
        state.begin(GatewayOp::CreateObjective)?;

        if let Some(reason) = state.rejected_paths.get(&request.path) {
            return Err(TierflowError::Api {
                message: reason.clone(),
                status: Some(409),
            });
        }
        if !state.auto_register_files && !state.path_exists(&request.path) {
            return Err(TierflowError::not_found(format!("path {}", request.path)));
        }

        let objective_uuid = uuid::Uuid::new_v4().to_string();
        let job_uuid = uuid::Uuid::new_v4().to_string();
        state.objectives.push(Objective {
            uuid: objective_uuid.clone(),
            name: format!("{} {}", request.objective_type, request.path),
            objective_type: request.objective_type.clone(),
            path: Some(request.path.clone()),
            tier_name: request.tier_name.clone(),
            state: Some("ACTIVE".to_string()),
            created: Some(Utc::now().to_rfc3339()),
        });

        let mut status = JobStatus::pending(job_uuid.clone());
        status.name = Some(format!("{} {}", request.objective_type, request.path));
        let scripted = ScriptedJob {
            status,
            polls_remaining: state.polls_before_terminal,
            outcome: state.job_outcome,
        };
        state.jobs.insert(job_uuid.clone(), scripted);

        Ok(ObjectiveSubmission {
            objective_uuid: Some(objective_uuid),
            job_uuid: Some(job_uuid),
        })
    }

    async fn list_objectives(&self, path: Option<&str>) -> Result<Vec<Objective>> {
        let mut state = self.lock();
        state.begin(GatewayOp::ListObjectives)?;
        Ok(state
            .objectives
            .iter()
            .filter(|o| path.map_or(true, |p| o.path.as_deref() == Some(p)))
            .cloned()
            .collect())
    }

    async fn remove_objective(&self, objective_uuid: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayOp::RemoveObjective)?;
        let before = state.objectives.len();
        state.objectives.retain(|o| o.uuid != objective_uuid);
        if state.objectives.len() == before {
            return Err(TierflowError::not_found(format!("objective {}", objective_uuid)));
        }
        Ok(())
    }

    async fn get_job_status(&self, job_uuid: &str) -> Result<JobStatus> {
        let mut state = self.lock();
        state.begin(GatewayOp::GetJobStatus)?;
        *state.job_polls.entry(job_uuid.to_string()).or_default() += 1;

        let job = state
            .jobs
            .get_mut(job_uuid)
            .ok_or_else(|| TierflowError::not_found(format!("job {}", job_uuid)))?;
        if !job.status.is_terminal() {
            if job.polls_remaining == 0 {
                job.status.state = job.outcome;
                job.status.progress = if job.outcome == JobState::Completed { 100.0 } else { job.status.progress };
                if job.outcome == JobState::Failed {
                    job.status.error_message = Some("data movement failed".to_string());
                }
            } else {
                job.polls_remaining -= 1;
                job.status.state = JobState::Running;
                job.status.progress = (job.status.progress + 25.0).min(95.0);
            }
            job.status.updated_at = Utc::now();
        }
        Ok(job.status.clone())
    }

    fn describe(&self) -> String {
        "in-memory fabric".to_string()
    }

    fn stats(&self) -> RequestStats {
        let state = self.lock();
        RequestStats {
            total_requests: state.calls.values().sum(),
            ..Default::default()
        }
    }
}

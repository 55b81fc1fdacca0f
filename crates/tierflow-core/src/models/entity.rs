//! Fabric entities and their catalog projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TierflowError;

/// File tags, keyed `namespace.key`.
pub type TagMap = BTreeMap<String, String>;

/// Discriminator for every entity the fabric exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    StorageVolume,
    ObjectStorageVolume,
    Share,
    File,
    Job,
    Objective,
}

impl EntityKind {
    /// Order in which a full sync visits entity kinds.
    pub const SYNC_ORDER: [EntityKind; 5] = [
        EntityKind::Node,
        EntityKind::StorageVolume,
        EntityKind::ObjectStorageVolume,
        EntityKind::Share,
        EntityKind::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::StorageVolume => "storage_volume",
            EntityKind::ObjectStorageVolume => "object_storage_volume",
            EntityKind::Share => "share",
            EntityKind::File => "file",
            EntityKind::Job => "job",
            EntityKind::Objective => "objective",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "node" | "nodes" => EntityKind::Node,
            "storage_volume" | "storage_volumes" => EntityKind::StorageVolume,
            "object_storage_volume" | "object_storage_volumes" => EntityKind::ObjectStorageVolume,
            "share" | "shares" => EntityKind::Share,
            "file" | "files" => EntityKind::File,
            "job" | "jobs" | "task" | "tasks" => EntityKind::Job,
            "objective" | "objectives" => EntityKind::Objective,
            _ => {
                return Err(TierflowError::invalid_params(format!(
                    "unknown entity kind '{}'",
                    s
                )))
            }
        };
        Ok(kind)
    }
}

/// Fields every fabric entity carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub uuid: String,
    pub name: String,
    pub created: Option<String>,
    pub modified: Option<String>,
    /// Fields the fabric returned that are not otherwise modeled.
    #[serde(default)]
    pub extended_info: serde_json::Map<String, Value>,
}

impl EntityMeta {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub node_type: Option<String>,
    pub endpoint: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageVolume {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub node_uuid: Option<String>,
    pub state: Option<String>,
    pub size_bytes: Option<u64>,
    pub used_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorageVolume {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub state: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Share {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub path: String,
    pub total_files: Option<u64>,
    pub size_bytes: Option<u64>,
}

/// A file (or directory) on the fabric.
///
/// The owning share/volume/node UUIDs are informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub path: String,
    pub size_bytes: Option<u64>,
    pub is_directory: bool,
    pub share_uuid: Option<String>,
    pub volume_uuid: Option<String>,
    pub node_uuid: Option<String>,
    pub replication_status: Option<String>,
    #[serde(default)]
    pub tags: TagMap,
}

impl FileEntry {
    /// Build a regular file entry whose name is the last path component.
    pub fn new(uuid: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            meta: EntityMeta::new(uuid, name),
            path,
            ..Default::default()
        }
    }
}

/// A snapshot of one syncable entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    StorageVolume(StorageVolume),
    ObjectStorageVolume(ObjectStorageVolume),
    Share(Share),
    File(FileEntry),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::StorageVolume(_) => EntityKind::StorageVolume,
            Entity::ObjectStorageVolume(_) => EntityKind::ObjectStorageVolume,
            Entity::Share(_) => EntityKind::Share,
            Entity::File(_) => EntityKind::File,
        }
    }

    pub fn meta(&self) -> &EntityMeta {
        match self {
            Entity::Node(n) => &n.meta,
            Entity::StorageVolume(v) => &v.meta,
            Entity::ObjectStorageVolume(v) => &v.meta,
            Entity::Share(s) => &s.meta,
            Entity::File(f) => &f.meta,
        }
    }

    /// Project this entity into a searchable catalog row.
    ///
    /// Kind-specific fields without a dedicated column are folded into
    /// the extended-info object.
    pub fn to_entry(&self, last_synced: DateTime<Utc>) -> CatalogEntry {
        let meta = self.meta();
        let mut extended = meta.extended_info.clone();
        let mut entry = CatalogEntry {
            id: 0,
            item_type: self.kind(),
            uuid: meta.uuid.clone(),
            name: meta.name.clone(),
            path: None,
            share_uuid: None,
            volume_uuid: None,
            node_uuid: None,
            size_bytes: None,
            is_directory: false,
            replication_status: None,
            tags: TagMap::new(),
            extended_info: Value::Null,
            created: meta.created.clone(),
            modified: meta.modified.clone(),
            last_synced,
        };

        match self {
            Entity::Node(n) => {
                insert_opt(&mut extended, "node_type", &n.node_type);
                insert_opt(&mut extended, "endpoint", &n.endpoint);
                insert_opt(&mut extended, "state", &n.state);
            }
            Entity::StorageVolume(v) => {
                entry.node_uuid = v.node_uuid.clone();
                entry.size_bytes = v.size_bytes;
                insert_opt(&mut extended, "state", &v.state);
                if let Some(used) = v.used_bytes {
                    extended.insert("used_bytes".into(), Value::from(used));
                }
            }
            Entity::ObjectStorageVolume(v) => {
                entry.size_bytes = v.size_bytes;
                insert_opt(&mut extended, "state", &v.state);
            }
            Entity::Share(s) => {
                entry.path = Some(s.path.clone());
                entry.size_bytes = s.size_bytes;
                if let Some(total) = s.total_files {
                    extended.insert("total_files".into(), Value::from(total));
                }
            }
            Entity::File(f) => {
                entry.path = Some(f.path.clone());
                entry.size_bytes = f.size_bytes;
                entry.is_directory = f.is_directory;
                entry.share_uuid = f.share_uuid.clone();
                entry.volume_uuid = f.volume_uuid.clone();
                entry.node_uuid = f.node_uuid.clone();
                entry.replication_status = f.replication_status.clone();
                entry.tags = f.tags.clone();
            }
        }

        entry.extended_info = Value::Object(extended);
        entry
    }
}

fn insert_opt(map: &mut serde_json::Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
}

/// A denormalized, searchable row in the local catalog.
///
/// Exactly one row exists per `(item_type, uuid)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Local row id; also the insertion order.
    pub id: i64,
    pub item_type: EntityKind,
    pub uuid: String,
    pub name: String,
    pub path: Option<String>,
    pub share_uuid: Option<String>,
    pub volume_uuid: Option<String>,
    pub node_uuid: Option<String>,
    pub size_bytes: Option<u64>,
    pub is_directory: bool,
    pub replication_status: Option<String>,
    pub tags: TagMap,
    pub extended_info: Value,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub last_synced: DateTime<Utc>,
}

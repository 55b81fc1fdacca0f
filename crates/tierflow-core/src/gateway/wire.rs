//! Decoding of the fabric's JSON representations.
//!
//! The management API is loose about field names (`uoid.uuid` vs `uuid`,
//! `sizeBytes` vs `size`) and about timestamp encodings, so objects are
//! decoded field by field. Anything not modeled is kept in the entity's
//! extended-info map rather than dropped.

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, TierflowError};
use crate::models::{
    EntityMeta, FileEntry, JobState, JobStatus, Node, ObjectStorageVolume, Objective,
    ObjectiveSubmission, ObjectiveType, Share, StorageVolume, TagMap,
};

/// A JSON object whose known fields are consumed as they are read.
struct WireObject {
    fields: Map<String, Value>,
}

impl WireObject {
    fn new(value: Value, what: &str) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(TierflowError::Api {
                message: format!("expected {} object, got {}", what, type_name(&other)),
                status: None,
            }),
        }
    }

    fn take(&mut self, keys: &[&str]) -> Option<Value> {
        let mut found = None;
        for key in keys {
            if let Some(value) = self.fields.remove(*key) {
                if found.is_none() && !value.is_null() {
                    found = Some(value);
                }
            }
        }
        found
    }

    fn take_str(&mut self, keys: &[&str]) -> Option<String> {
        self.take(keys).and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    fn take_u64(&mut self, keys: &[&str]) -> Option<u64> {
        self.take(keys).and_then(|v| match v {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    fn take_f64(&mut self, keys: &[&str]) -> Option<f64> {
        self.take(keys).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        })
    }

    /// Read a UUID from `uoid.uuid`, a nested `{key: {uoid: {uuid}}}`, or a flat field.
    fn take_ref_uuid(&mut self, nested: &str, flat: &[&str]) -> Option<String> {
        if let Some(value) = self.take(&[nested]) {
            if let Some(uuid) = uuid_of(&value) {
                return Some(uuid);
            }
        }
        self.take_str(flat)
    }

    fn take_timestamp(&mut self, keys: &[&str]) -> Option<String> {
        self.take(keys).and_then(|v| timestamp_string(&v))
    }

    fn into_meta(mut self, fallback_name: Option<&str>) -> Result<(EntityMeta, Self)> {
        let uuid = self
            .take(&["uoid"])
            .and_then(|v| uuid_of(&v))
            .or_else(|| self.take_str(&["uuid", "id"]))
            .ok_or_else(|| TierflowError::Api {
                message: "fabric object has no uuid".to_string(),
                status: None,
            })?;
        let name = self
            .take_str(&["name"])
            .or_else(|| fallback_name.map(str::to_string))
            .unwrap_or_else(|| uuid.clone());
        let created = self.take_timestamp(&["created", "createdAt", "creationTime"]);
        let modified = self.take_timestamp(&["modified", "modifiedAt", "lastModified"]);

        let mut extended_info = match self.take(&["extendedInfo", "extended_info"]) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        extended_info.retain(|_, v| !v.is_null());

        let meta = EntityMeta {
            uuid,
            name,
            created,
            modified,
            extended_info,
        };
        Ok((meta, self))
    }

    fn finish(self, meta: &mut EntityMeta) {
        for (key, value) in self.fields {
            if !value.is_null() && !meta.extended_info.contains_key(&key) {
                meta.extended_info.insert(key, value);
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn uuid_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| map.get("uoid").and_then(uuid_of)),
        _ => None,
    }
}

/// Epoch milliseconds or strings both become RFC 3339 text.
fn timestamp_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(|dt| dt.to_rfc3339())
        }
        _ => None,
    }
}

/// Unwrap a list response: a bare array, or an object holding
/// `children`, `items`, or `results`.
pub(crate) fn list_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => {
            for key in ["children", "items", "results", "files"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(TierflowError::Api {
                message: "list response has no item array".to_string(),
                status: None,
            })
        }
        other => Err(TierflowError::Api {
            message: format!("expected list response, got {}", type_name(&other)),
            status: None,
        }),
    }
}

pub(crate) fn node(value: Value) -> Result<Node> {
    let (mut meta, mut obj) = WireObject::new(value, "node")?.into_meta(None)?;
    let node_type = obj.take_str(&["nodeType", "_type", "type"]);
    let endpoint = obj.take_str(&["endpoint", "mgmtIpAddress", "address"]);
    let state = obj.take_str(&["operState", "state", "status"]);
    obj.finish(&mut meta);
    Ok(Node {
        meta,
        node_type,
        endpoint,
        state,
    })
}

pub(crate) fn storage_volume(value: Value) -> Result<StorageVolume> {
    let (mut meta, mut obj) = WireObject::new(value, "storage volume")?.into_meta(None)?;
    let node_uuid = obj.take_ref_uuid("node", &["nodeUuid"]);
    let state = obj.take_str(&["operState", "state", "status"]);
    let size_bytes = obj.take_u64(&["sizeBytes", "size", "capacity"]);
    let used_bytes = obj.take_u64(&["usedBytes", "used"]);
    obj.finish(&mut meta);
    Ok(StorageVolume {
        meta,
        node_uuid,
        state,
        size_bytes,
        used_bytes,
    })
}

pub(crate) fn object_storage_volume(value: Value) -> Result<ObjectStorageVolume> {
    let (mut meta, mut obj) = WireObject::new(value, "object storage volume")?.into_meta(None)?;
    let state = obj.take_str(&["operState", "state", "status"]);
    let size_bytes = obj.take_u64(&["sizeBytes", "size", "capacity"]);
    obj.finish(&mut meta);
    Ok(ObjectStorageVolume {
        meta,
        state,
        size_bytes,
    })
}

pub(crate) fn share(value: Value) -> Result<Share> {
    let (mut meta, mut obj) = WireObject::new(value, "share")?.into_meta(None)?;
    let path = obj.take_str(&["path", "exportPath"]).unwrap_or_default();
    let total_files = obj.take_u64(&["totalNumberOfFiles", "totalFiles"]);
    let size_bytes = obj.take_u64(&["sizeBytes", "size", "totalSize"]);
    obj.finish(&mut meta);
    Ok(Share {
        meta,
        path,
        total_files,
        size_bytes,
    })
}

pub(crate) fn file(value: Value) -> Result<FileEntry> {
    let mut obj = WireObject::new(value, "file")?;
    let path = obj.take_str(&["path", "fullPath"]).ok_or_else(|| TierflowError::Api {
        message: "file object has no path".to_string(),
        status: None,
    })?;
    let fallback_name = path.rsplit('/').next().unwrap_or_default().to_string();
    let (mut meta, mut obj) = obj.into_meta(Some(&fallback_name))?;

    let is_directory = match obj.take(&["type", "fileType"]) {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("DIRECTORY"),
        _ => false,
    } || matches!(obj.take(&["isDirectory", "directory"]), Some(Value::Bool(true)));
    let size_bytes = obj.take_u64(&["sizeBytes", "size"]);
    let share_uuid = obj.take_ref_uuid("share", &["shareUuid"]);
    let volume_uuid = obj.take_ref_uuid("volume", &["volumeUuid"]);
    let node_uuid = obj.take_ref_uuid("node", &["nodeUuid"]);
    let replication_status = obj.take_str(&["replicationStatus", "replication"]);
    let tags = obj.take(&["tags", "attributes"]).map(tag_map).unwrap_or_default();
    obj.finish(&mut meta);

    Ok(FileEntry {
        meta,
        path,
        size_bytes,
        is_directory,
        share_uuid,
        volume_uuid,
        node_uuid,
        replication_status,
        tags,
    })
}

/// Decode a tag collection: either `{key: value}` or `[{name, value}]`,
/// optionally wrapped in `{tags: ...}`.
pub(crate) fn tag_map(value: Value) -> TagMap {
    let value = match value {
        Value::Object(mut map) if map.contains_key("tags") => map.remove("tags").unwrap_or_default(),
        other => other,
    };
    let mut tags = TagMap::new();
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(text) = scalar_text(&value) {
                    tags.insert(key, text);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let key = item.get("name").or_else(|| item.get("key")).and_then(Value::as_str);
                let value = item.get("value").and_then(scalar_text);
                if let (Some(key), Some(value)) = (key, value) {
                    tags.insert(key.to_string(), value);
                }
            }
        }
        _ => {}
    }
    tags
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn job_status(value: Value, requested_id: &str) -> Result<JobStatus> {
    let mut obj = WireObject::new(value, "job")?;
    let job_id = obj
        .take(&["uoid"])
        .and_then(|v| uuid_of(&v))
        .or_else(|| obj.take_str(&["uuid", "id"]))
        .unwrap_or_else(|| requested_id.to_string());
    let state = obj
        .take_str(&["status", "state"])
        .map(|s| JobState::from_fabric(&s))
        .unwrap_or(JobState::Pending);
    let mut progress = obj.take_f64(&["progress", "percentComplete"]).unwrap_or(0.0);
    if progress > 0.0 && progress < 1.0 && state != JobState::Completed {
        // Fractions are reported by some fabric versions
        progress *= 100.0;
    }
    if state == JobState::Completed {
        progress = 100.0;
    }
    let error_message = obj.take_str(&["errorMessage", "error", "failureReason"]);
    let name = obj.take_str(&["name"]);

    Ok(JobStatus {
        job_id,
        state,
        progress: progress.clamp(0.0, 100.0) as f32,
        error_message,
        name,
        updated_at: Utc::now(),
    })
}

pub(crate) fn objective(value: Value) -> Result<Objective> {
    let (mut meta, mut obj) = WireObject::new(value, "objective")?.into_meta(None)?;
    let objective_type = obj
        .take_str(&["objectiveType", "type"])
        .map(|s| s.parse::<ObjectiveType>())
        .transpose()?
        .unwrap_or_else(|| ObjectiveType::Other("unknown".to_string()));
    let path = obj.take_str(&["path", "target"]);
    let tier_name = obj.take_str(&["tierName", "tier"]);
    let state = obj.take_str(&["state", "status"]);
    obj.finish(&mut meta);
    Ok(Objective {
        uuid: meta.uuid,
        name: meta.name,
        objective_type,
        path,
        tier_name,
        state,
        created: meta.created,
    })
}

pub(crate) fn submission(value: Value) -> Result<ObjectiveSubmission> {
    if value.is_null() {
        return Ok(ObjectiveSubmission {
            objective_uuid: None,
            job_uuid: None,
        });
    }
    let mut obj = WireObject::new(value, "objective submission")?;
    let objective_uuid = obj
        .take(&["uoid"])
        .and_then(|v| uuid_of(&v))
        .or_else(|| obj.take_str(&["objectiveUuid", "uuid"]));
    let job_uuid = obj
        .take(&["job", "task"])
        .and_then(|v| uuid_of(&v))
        .or_else(|| obj.take_str(&["jobUuid", "taskUuid", "jobId"]));
    Ok(ObjectiveSubmission {
        objective_uuid,
        job_uuid,
    })
}

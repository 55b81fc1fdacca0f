//! Placement objectives submitted to the fabric.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::TierflowError;

/// Kind of placement policy requested from the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ObjectiveType {
    PlaceOnTier,
    ExcludeFromTier,
    Replication,
    Migration,
    Copy,
    Move,
    Sync,
    Backup,
    Archive,
    /// A fabric-specific objective name passed through unchanged.
    Other(String),
}

impl ObjectiveType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectiveType::PlaceOnTier => "place_on_tier",
            ObjectiveType::ExcludeFromTier => "exclude_from_tier",
            ObjectiveType::Replication => "replication",
            ObjectiveType::Migration => "migration",
            ObjectiveType::Copy => "copy",
            ObjectiveType::Move => "move",
            ObjectiveType::Sync => "sync",
            ObjectiveType::Backup => "backup",
            ObjectiveType::Archive => "archive",
            ObjectiveType::Other(name) => name,
        }
    }

    /// Whether the objective targets a named tier.
    pub fn needs_tier(&self) -> bool {
        matches!(
            self,
            ObjectiveType::PlaceOnTier | ObjectiveType::ExcludeFromTier
        )
    }
}

impl fmt::Display for ObjectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveType {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TierflowError::invalid_params("objective type must not be empty"));
        }
        let normalized = trimmed.to_ascii_lowercase().replace(['-', ' '], "_");
        Ok(match normalized.as_str() {
            "place_on_tier" => ObjectiveType::PlaceOnTier,
            "exclude_from_tier" => ObjectiveType::ExcludeFromTier,
            "replication" => ObjectiveType::Replication,
            "migration" => ObjectiveType::Migration,
            "copy" => ObjectiveType::Copy,
            "move" => ObjectiveType::Move,
            "sync" => ObjectiveType::Sync,
            "backup" => ObjectiveType::Backup,
            "archive" => ObjectiveType::Archive,
            _ => ObjectiveType::Other(trimmed.to_string()),
        })
    }
}

impl From<ObjectiveType> for String {
    fn from(value: ObjectiveType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for ObjectiveType {
    type Error = TierflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A request to apply an objective to one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRequest {
    pub objective_type: ObjectiveType,
    pub path: String,
    pub tier_name: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
}

impl ObjectiveRequest {
    pub fn new(
        objective_type: ObjectiveType,
        path: impl Into<String>,
        tier_name: Option<String>,
    ) -> Self {
        Self {
            objective_type,
            path: path.into(),
            tier_name,
            parameters: serde_json::Map::new(),
        }
    }

    /// Reject requests the fabric could never accept.
    pub fn validate(&self) -> crate::Result<()> {
        if self.path.trim().is_empty() {
            return Err(TierflowError::invalid_params("objective path must not be empty"));
        }
        if self.objective_type.needs_tier()
            && self.tier_name.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(TierflowError::invalid_params(format!(
                "objective '{}' requires a tier name",
                self.objective_type
            )));
        }
        Ok(())
    }
}

/// What the fabric returned for an accepted objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSubmission {
    pub objective_uuid: Option<String>,
    /// Data-movement job scheduled for the objective, when one was created.
    pub job_uuid: Option<String>,
}

/// An objective currently registered on the fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub uuid: String,
    pub name: String,
    pub objective_type: ObjectiveType,
    pub path: Option<String>,
    pub tier_name: Option<String>,
    pub state: Option<String>,
    pub created: Option<String>,
}

impl Objective {
    /// Whether this objective places `path` according to `objective_type`/`tier`.
    pub fn matches(&self, objective_type: &ObjectiveType, tier: Option<&str>) -> bool {
        if &self.objective_type != objective_type {
            return false;
        }
        match tier {
            Some(tier) => self
                .tier_name
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(tier)),
            None => true,
        }
    }
}

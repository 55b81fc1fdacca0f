//! Structured result envelope for every public operation.
//!
//! Each tool response carries an explicit `success` flag and a human-readable
//! `message`, with the operation's payload flattened next to them. An empty
//! payload is therefore never ambiguous with a failure.

use serde::{Deserialize, Serialize};

use crate::error::TierflowError;

/// Generic response wrapper.
///
/// # Example
///
/// ```ignore
/// use tierflow_core::models::ApiResponse;
///
/// #[derive(Serialize)]
/// struct JobList { jobs: Vec<JobStatus>, total: usize }
///
/// let response = ApiResponse::success("3 jobs", JobList { jobs, total: 3 });
/// let failure: ApiResponse<JobList> = ApiResponse::error("fabric unreachable");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error class, e.g. `not_found`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            error_kind: None,
            data: Some(data),
        }
    }

    /// Create a response whose outcome was decided by the payload itself.
    pub fn with_outcome(success: bool, message: impl Into<String>, data: T) -> Self {
        let message = message.into();
        Self {
            success,
            error: (!success).then(|| message.clone()),
            message,
            error_kind: None,
            data: Some(data),
        }
    }

    /// Create an error response without data.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(message.clone()),
            message,
            error_kind: None,
            data: None,
        }
    }

    /// Create an error response from a library error.
    pub fn from_error(err: &TierflowError) -> Self {
        let mut response = Self::error(err.to_string());
        response.error_kind = Some(err.kind().to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

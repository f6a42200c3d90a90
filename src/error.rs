//! Error types for soprun.
//!
//! Failures carry enough context (node id, action type, attempt count) to
//! reconstruct the failure point from the step history alone, and each
//! variant maps to a stable code that callers can parse programmatically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for soprun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// soprun error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed document or dangling edge reference. Fatal at load.
    #[error("Validation error: {0}")]
    Validation(String),

    /// One or more credential requirements could not be resolved.
    /// Fatal at run start, before any side effect.
    #[error("Missing credentials: {}", missing.join(", "))]
    CredentialMissing { missing: Vec<String> },

    /// An action dispatch failed. Recoverable per node-handler policy.
    #[error("Action '{action_type}' failed on node '{node_id}': {message}")]
    Action {
        node_id: String,
        action_type: String,
        message: String,
    },

    /// A loop iteration failed after exhausting its retry policy.
    #[error("Iteration {index} of loop '{node_id}' failed after {attempts} attempt(s): {message}")]
    Iteration {
        node_id: String,
        index: usize,
        attempts: u32,
        message: String,
    },

    /// Step-count or iteration ceiling hit. Reported, run halted.
    #[error("Safety limit exceeded: {0}")]
    SafetyLimit(String),

    /// An assert node found an unmet condition. Non-retryable by design;
    /// signals a precondition violation, not a transient fault.
    #[error("Assertion failed on node '{node_id}': {message}")]
    Assertion { node_id: String, message: String },

    /// General interpreter-level failure (unknown node, bad state, etc.).
    #[error("Execution error: {0}")]
    Execution(String),

    /// The reasoning collaborator returned output with an unusable shape.
    #[error("Reasoning output error: {0}")]
    Reasoning(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the stable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::CredentialMissing { .. } => "CREDENTIAL_MISSING",
            Error::Action { .. } => "ACTION_FAILURE",
            Error::Iteration { .. } => "ITERATION_FAILURE",
            Error::SafetyLimit(_) => "SAFETY_LIMIT_EXCEEDED",
            Error::Assertion { .. } => "ASSERTION_FAILED",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Reasoning(_) => "REASONING_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Node id this error is attached to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Error::Action { node_id, .. }
            | Error::Iteration { node_id, .. }
            | Error::Assertion { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Structured failure report surfaced by the run-control API.
///
/// The control surface never propagates an `Error` past its boundary; it
/// returns this envelope instead, with partial progress preserved in the
/// run's step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
    /// Stable error code.
    pub code: String,
    /// Node where the failure occurred, when attributable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Attempt count at the point of failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Human-readable details.
    pub details: String,
}

impl StepFailure {
    pub fn from_error(error: &Error, fallback_node: Option<&str>) -> Self {
        let attempt = match error {
            Error::Iteration { attempts, .. } => Some(*attempts),
            _ => None,
        };
        Self {
            code: error.code().to_string(),
            step_id: error.node_id().or(fallback_node).map(|id| id.to_string()),
            attempt,
            details: error.to_string(),
        }
    }

    /// Convert to the `{success:false, stepId, details}` JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "code": self.code,
            "stepId": self.step_id,
            "details": self.details,
        })
    }
}

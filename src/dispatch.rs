//! Action dispatcher boundary.
//!
//! The engine treats page control as an opaque, awaitable capability keyed
//! by action type. How navigation, clicking, or extraction actually happen
//! is the collaborator's business; declared timeouts are enforced there,
//! not here. Within a run at most one action is in flight at a time (the
//! collaborator's session is not reentrant), which the interpreter
//! guarantees by awaiting every dispatch to completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::InjectedAction;
use crate::error::Result;

/// Identifies the run and node an action belongs to.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub run_id: String,
    pub node_id: String,
}

/// Result of one action dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutput {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Boundary to the external page-control collaborator.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Execute one action against the controlled page.
    ///
    /// `Err` means the dispatch itself broke (session gone, protocol
    /// error); a page-level failure comes back as `success: false`.
    async fn dispatch(
        &self,
        action: &InjectedAction,
        ctx: &DispatchContext,
    ) -> Result<ActionOutput>;

    /// Release the underlying browser/page session. Called on stop.
    async fn release(&self) {}
}

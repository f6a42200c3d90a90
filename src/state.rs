//! Per-run execution state.
//!
//! `ExecutionState` has exactly one writer (the interpreter and the node
//! handlers it calls), so no locking is needed within a run. It serializes
//! to an opaque checkpoint that round-trips exactly, which is what makes
//! pause/resume and idempotent re-entry work.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::retry::BreakerState;
use crate::error::{Error, Result};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// A dispatch was attempted (one record per action dispatch).
    Attempted,
    /// The node finished successfully.
    Completed,
    /// The node was skipped (operator skip or idempotent resume).
    Skipped,
    /// The node failed.
    Failed,
}

/// One entry in the ordered step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,
    pub status: StepStatus,
    /// Attempt number for retried iteration bodies, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Loop position for nested iteration, pushed per active loop.
///
/// `index` is the next element to process, so a frame persisted after
/// finishing item 2 of 5 resumes at index 2 (items 3-5, exactly once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationFrame {
    pub loop_node_id: String,
    pub list_variable: String,
    pub item_variable: String,
    pub index_variable: String,
    pub index: usize,
}

/// Mutable state of one run. Created at run start, mutated exclusively by
/// the interpreter, discarded or checkpointed at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub run_id: String,
    pub status: RunStatus,
    pub current_node_id: Option<String>,
    /// Variables populated by extraction, filter, and generator nodes.
    /// Credential plaintext never appears here.
    pub variables: BTreeMap<String, Value>,
    /// Stack of active loop positions, innermost last.
    pub iteration_stack: Vec<IterationFrame>,
    /// Strictly increasing step counter, checked against the safety ceiling.
    pub step_count: u64,
    /// Consecutive-failure counters, keyed by loop node id.
    pub breakers: BTreeMap<String, BreakerState>,
    /// Ordered log of attempted/skipped/failed node ids.
    pub step_history: Vec<StepRecord>,
}

impl ExecutionState {
    /// Create fresh state for a new run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            current_node_id: None,
            variables: BTreeMap::new(),
            iteration_stack: Vec::new(),
            step_count: 0,
            breakers: BTreeMap::new(),
            step_history: Vec::new(),
        }
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Append a step record.
    pub fn record(&mut self, node_id: &str, status: StepStatus) {
        self.record_detail(node_id, status, None, None);
    }

    pub fn record_detail(
        &mut self,
        node_id: &str,
        status: StepStatus,
        attempt: Option<u32>,
        detail: Option<String>,
    ) {
        self.step_history.push(StepRecord {
            node_id: node_id.to_string(),
            status,
            attempt,
            detail,
            at: Utc::now(),
        });
    }

    /// Number of dispatch attempts recorded for a node.
    pub fn dispatch_attempts(&self, node_id: &str) -> usize {
        self.step_history
            .iter()
            .filter(|r| r.node_id == node_id && r.status == StepStatus::Attempted)
            .count()
    }

    /// Active iteration frame for a loop node, if one was persisted.
    pub fn frame_for(&self, loop_node_id: &str) -> Option<&IterationFrame> {
        self.iteration_stack
            .iter()
            .rev()
            .find(|f| f.loop_node_id == loop_node_id)
    }

    pub fn frame_for_mut(&mut self, loop_node_id: &str) -> Option<&mut IterationFrame> {
        self.iteration_stack
            .iter_mut()
            .rev()
            .find(|f| f.loop_node_id == loop_node_id)
    }

    pub fn push_frame(&mut self, frame: IterationFrame) {
        self.iteration_stack.push(frame);
    }

    /// Pop the frame for a finished loop. Also clears its item bindings.
    pub fn pop_frame(&mut self, loop_node_id: &str) {
        if let Some(pos) = self
            .iteration_stack
            .iter()
            .rposition(|f| f.loop_node_id == loop_node_id)
        {
            let frame = self.iteration_stack.remove(pos);
            self.variables.remove(&frame.item_variable);
            self.variables.remove(&frame.index_variable);
        }
    }

    /// Consecutive-failure counter for a loop, created on first use.
    pub fn breaker_mut(&mut self, loop_node_id: &str) -> &mut BreakerState {
        self.breakers
            .entry(loop_node_id.to_string())
            .or_default()
    }

    /// Serialize to an opaque checkpoint value.
    pub fn checkpoint(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Restore state from a checkpoint produced by [`Self::checkpoint`].
    pub fn restore(checkpoint: Value) -> Result<Self> {
        serde_json::from_value(checkpoint)
            .map_err(|e| Error::Execution(format!("Invalid checkpoint: {}", e)))
    }
}

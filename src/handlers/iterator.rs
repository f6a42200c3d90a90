//! Loop node handler.

use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::engine::retry;
use crate::error::{Error, Result};
use crate::reasoning;
use crate::state::{ExecutionState, IterationFrame, StepStatus};
use crate::workflow::Node;

use super::{run_children, Flow, HandlerCtx};

/// Iterate a list variable, executing the children once per element.
///
/// Progress lives in an [`IterationFrame`] on the run state, so a paused
/// or checkpointed run resumes at the exact element it stopped before.
/// Each iteration body runs as one atomic unit under the node's retry
/// policy; consecutive exhausted iterations feed the loop's circuit
/// breaker, which halts the loop early once the configured threshold is
/// crossed. Whatever the exit path, the frame never outlives the loop:
/// a failed loop pops it too, so re-entering the node (a fresh inner
/// loop under a tolerant outer one) starts from the first element again.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) async fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    let config = node
        .iterator
        .as_ref()
        .ok_or_else(|| Error::Execution(format!("Loop node '{}' has no iterator", node.id)))?;

    let list = state
        .get_variable(&config.list_variable)
        .cloned()
        .ok_or_else(|| {
            Error::Execution(format!(
                "Loop node '{}' list variable '{}' is not set",
                node.id, config.list_variable
            ))
        })?;
    let items = reasoning::coerce_array(&list)?;

    let limit = items.len().min(config.max_iterations);
    if items.len() > config.max_iterations {
        warn!(
            items = items.len(),
            max_iterations = config.max_iterations,
            "List exceeds iteration cap, trailing items will not be processed"
        );
    }

    let mut index = match state.frame_for(&node.id) {
        Some(frame) => {
            debug!(index = frame.index, "Resuming loop from persisted frame");
            frame.index
        }
        None => {
            state.push_frame(IterationFrame {
                loop_node_id: node.id.clone(),
                list_variable: config.list_variable.clone(),
                item_variable: config.item_variable.clone(),
                index_variable: config.index_variable.clone(),
                index: 0,
            });
            0
        }
    };

    let policy = node.retry.clone().unwrap_or_default();
    let max_attempts = policy.max_attempts.max(1);
    let mut processed = 0usize;
    let mut failed = 0usize;

    while index < limit {
        if ctx.signals.pause_requested() || ctx.signals.stop_requested() {
            // Frame stays at the current element; resume picks it up.
            return Ok(Flow::Pause);
        }

        state.set_variable(&config.item_variable, items[index].clone());
        state.set_variable(&config.index_variable, json!(index));
        debug!(index, "Starting iteration");

        let mut attempt = 1u32;
        let body = loop {
            match run_children(ctx, &node.id, &node.children, state).await {
                Ok(flow) => break Ok(flow),
                Err(e) if attempt < max_attempts => {
                    let delay = retry::backoff_delay(&policy, attempt);
                    warn!(
                        index,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Iteration attempt failed: {}. Retrying",
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match body {
            Ok(Flow::Pause) => return Ok(Flow::Pause),
            Ok(_) => {
                if policy.circuit_breaker_enabled {
                    state.breaker_mut(&node.id).record_success();
                }
                processed += 1;
                index += 1;
                advance_frame(state, &node.id, index);
            }
            Err(e) => {
                state.record_detail(
                    &node.id,
                    StepStatus::Failed,
                    Some(attempt),
                    Some(format!("item {}: {}", index, e)),
                );
                failed += 1;

                let tripped = policy.circuit_breaker_enabled
                    && state
                        .breaker_mut(&node.id)
                        .record_failure(ctx.config.breaker_threshold);

                if !config.continue_on_error {
                    state.pop_frame(&node.id);
                    return Err(Error::Iteration {
                        node_id: node.id.clone(),
                        index,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }

                if tripped {
                    warn!(
                        index,
                        threshold = ctx.config.breaker_threshold,
                        "Circuit breaker tripped, halting loop early"
                    );
                    state.record_detail(
                        &node.id,
                        StepStatus::Failed,
                        None,
                        Some("circuit breaker tripped".to_string()),
                    );
                    break;
                }

                index += 1;
                advance_frame(state, &node.id, index);
            }
        }
    }

    info!(processed, failed, total = items.len(), "Loop finished");
    state.pop_frame(&node.id);
    state.record_detail(
        &node.id,
        StepStatus::Completed,
        None,
        Some(format!("processed {} of {}", processed, items.len())),
    );
    Ok(Flow::LoopExit)
}

fn advance_frame(state: &mut ExecutionState, node_id: &str, index: usize) {
    if let Some(frame) = state.frame_for_mut(node_id) {
        frame.index = index;
    }
}

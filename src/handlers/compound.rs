//! Compound node handler.

use tracing::{debug, instrument};

use crate::error::Result;
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{run_children, Flow, HandlerCtx};

/// Execute a compound node.
///
/// With `auto_expand` set, the children run in listed order as one unit.
/// Without it the node is a pure grouping label and completes immediately.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) async fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    if !node.auto_expand {
        debug!("Grouping label, nothing to execute");
        state.record_detail(
            &node.id,
            StepStatus::Completed,
            None,
            Some("grouping label".to_string()),
        );
        return Ok(Flow::Next);
    }

    if let Flow::Pause = run_children(ctx, &node.id, &node.children, state).await? {
        return Ok(Flow::Pause);
    }

    state.record(&node.id, StepStatus::Completed);
    Ok(Flow::Next)
}

//! Decision node handler.

use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{conditions, Flow, HandlerCtx};

/// Evaluate the node's condition over the run's variables and follow the
/// matching yes/no edge. Evaluation is deterministic; the branch taken is
/// a pure function of current state.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    let expression = node
        .condition
        .as_deref()
        .ok_or_else(|| Error::Execution(format!("Decision node '{}' has no condition", node.id)))?;

    let outcome = conditions::eval_bool(expression, &state.variables)?;
    let target = ctx.graph.branch_target(&node.id, outcome)?.to_string();

    info!(outcome, target = %target, "Decision branch taken");
    state.record_detail(
        &node.id,
        StepStatus::Completed,
        None,
        Some(format!("branch: {}", if outcome { "yes" } else { "no" })),
    );
    Ok(Flow::Goto(target))
}

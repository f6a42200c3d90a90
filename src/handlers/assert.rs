//! Assert node handler.

use tracing::instrument;

use crate::error::{Error, Result};
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{conditions, Flow};

/// Evaluate every declared precondition. The first unmet condition fails
/// the node with its declared message; downstream steps never run on a
/// broken assumption. Paired with loop bodies, this is what keeps resumed
/// runs from reprocessing items that are already in their end state.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) fn run(node: &Node, state: &mut ExecutionState) -> Result<Flow> {
    for check in &node.assert_conditions {
        let holds = conditions::eval_bool(&check.expression, &state.variables)?;
        if !holds {
            return Err(Error::Assertion {
                node_id: node.id.clone(),
                message: check
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("condition not met: {}", check.expression)),
            });
        }
    }

    state.record(&node.id, StepStatus::Completed);
    Ok(Flow::Next)
}

//! Generator node handler.

use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{Flow, HandlerCtx};

/// Produce derived content via the reasoning collaborator.
///
/// The prompt goes out with a snapshot of the run's variables as input;
/// whatever structured value comes back is stored under the configured
/// output variable.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) async fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    let config = node.generator.as_ref().ok_or_else(|| {
        Error::Execution(format!("Generator node '{}' has no configuration", node.id))
    })?;

    let input = Value::Object(
        state
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    let output = ctx.reasoning.reason(&config.prompt, &input).await?;

    info!(output_variable = %config.output_variable, "Generator completed");
    state.set_variable(&config.output_variable, output);
    state.record(&node.id, StepStatus::Completed);
    Ok(Flow::Next)
}

//! Task node handler.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::credentials;
use crate::dispatch::DispatchContext;
use crate::error::{Error, Result};
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{Flow, HandlerCtx};

/// Dispatch each declared action strictly in order.
///
/// The first failure aborts the node; later actions are never dispatched.
/// Credentials are substituted into a copy of the payload immediately
/// before dispatch and wiped the moment the dispatcher returns. Extract
/// results land in the run's variables under `store_as`.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) async fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    for action in &node.actions {
        let mut injected = credentials::inject(action, ctx.credentials)?;
        state.record(&node.id, StepStatus::Attempted);

        let dispatch_ctx = DispatchContext {
            run_id: ctx.run_id.to_string(),
            node_id: node.id.clone(),
        };
        let outcome = ctx.dispatcher.dispatch(&injected, &dispatch_ctx).await;
        injected.wipe();

        let output = outcome.map_err(|e| Error::Action {
            node_id: node.id.clone(),
            action_type: action.action_type.as_str().to_string(),
            message: e.to_string(),
        })?;

        if !output.success {
            return Err(Error::Action {
                node_id: node.id.clone(),
                action_type: action.action_type.as_str().to_string(),
                message: output
                    .error
                    .unwrap_or_else(|| "action reported failure".to_string()),
            });
        }

        if let Some(name) = &action.store_as {
            state.set_variable(name, output.data.unwrap_or(Value::Null));
        }
    }

    debug!(actions = node.actions.len(), "Task completed");
    state.record(&node.id, StepStatus::Completed);
    Ok(Flow::Next)
}

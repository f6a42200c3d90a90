//! Node handlers.
//!
//! One handler per node kind. The kind set is closed, so dispatch is an
//! exhaustive match; adding a kind without a handler fails to compile.

mod assert;
mod compound;
pub mod conditions;
mod decision;
mod filter;
mod generator;
mod iterator;
mod task;

use crate::config::EngineConfig;
use crate::credentials::CredentialStore;
use crate::dispatch::ActionDispatcher;
use crate::engine::signals::RunSignals;
use crate::error::{Error, Result};
use crate::reasoning::ReasoningClient;
use crate::state::ExecutionState;
use crate::workflow::{DocumentGraph, Node, NodeKind};

/// What the interpreter should do after a node handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Follow the default outgoing edge.
    Next,
    /// Jump to a named node (decision branches).
    Goto(String),
    /// Follow the loop's exit edge.
    LoopExit,
    /// A pause or stop request was observed mid-node; halt at this boundary.
    Pause,
}

/// Borrowed execution context shared by every handler.
pub struct HandlerCtx<'a> {
    pub graph: &'a DocumentGraph,
    pub dispatcher: &'a dyn ActionDispatcher,
    pub credentials: &'a dyn CredentialStore,
    pub reasoning: &'a dyn ReasoningClient,
    pub config: &'a EngineConfig,
    pub signals: &'a RunSignals,
    pub run_id: &'a str,
}

/// Execute one node.
pub async fn run_node(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    match node.kind {
        NodeKind::Task => task::run(ctx, node, state).await,
        NodeKind::Compound => compound::run(ctx, node, state).await,
        NodeKind::Decision => decision::run(ctx, node, state),
        NodeKind::Loop => iterator::run(ctx, node, state).await,
        NodeKind::Assert => assert::run(node, state),
        NodeKind::Filter => filter::run(ctx, node, state).await,
        NodeKind::Generator => generator::run(ctx, node, state).await,
    }
}

/// Count one node execution against the safety ceiling.
pub(crate) fn bump_step(state: &mut ExecutionState, config: &EngineConfig) -> Result<()> {
    if state.step_count >= config.max_steps {
        return Err(Error::SafetyLimit(format!(
            "Step ceiling of {} exceeded",
            config.max_steps
        )));
    }
    state.step_count += 1;
    Ok(())
}

/// Run a body's children in listed order.
///
/// A child decision may jump to a named sibling within the same body; a
/// branch target outside the body is an error. Returns `Flow::Pause` when
/// a nested loop observed a pause request, `Flow::Next` otherwise.
pub(crate) async fn run_children(
    ctx: &HandlerCtx<'_>,
    parent_id: &str,
    children: &[String],
    state: &mut ExecutionState,
) -> Result<Flow> {
    let mut idx = 0;
    while idx < children.len() {
        bump_step(state, ctx.config)?;
        let child = ctx.graph.node(&children[idx])?;
        match Box::pin(run_node(ctx, child, state)).await? {
            Flow::Next | Flow::LoopExit => idx += 1,
            Flow::Goto(target) => match children.iter().position(|c| *c == target) {
                Some(pos) => idx = pos,
                None => {
                    return Err(Error::Execution(format!(
                        "Decision in '{}' targets '{}', which is outside the body",
                        parent_id, target
                    )))
                }
            },
            Flow::Pause => return Ok(Flow::Pause),
        }
    }
    Ok(Flow::Next)
}

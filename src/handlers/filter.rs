//! Filter node handler.

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::reasoning;
use crate::state::{ExecutionState, StepStatus};
use crate::workflow::Node;

use super::{Flow, HandlerCtx};

/// Partition an array variable with the reasoning collaborator.
///
/// The input is split into contiguous batches of `batch_size`; each batch
/// goes out with the filter criteria and must come back as a boolean mask
/// of exactly the batch's length. Kept elements land in the output
/// variable in their original order. Mask shape violations are hard
/// errors, never silently padded or truncated.
#[instrument(skip_all, fields(node_id = %node.id))]
pub(super) async fn run(
    ctx: &HandlerCtx<'_>,
    node: &Node,
    state: &mut ExecutionState,
) -> Result<Flow> {
    let config = node
        .filter
        .as_ref()
        .ok_or_else(|| Error::Execution(format!("Filter node '{}' has no configuration", node.id)))?;

    let input = state
        .get_variable(&config.input_variable)
        .cloned()
        .ok_or_else(|| {
            Error::Execution(format!(
                "Filter node '{}' input variable '{}' is not set",
                node.id, config.input_variable
            ))
        })?;

    // Collaborators sometimes hand back a numeric-keyed object where an
    // array belongs; coerce before batching.
    let items = reasoning::coerce_array(&input)?;

    let mut kept = Vec::new();
    for batch in items.chunks(config.batch_size.max(1)) {
        let prompt = format!(
            "Evaluate each item against these criteria and answer with a \
             JSON array of booleans, one per item, in order.\n\nCriteria: {}",
            config.criteria
        );
        let response = ctx
            .reasoning
            .reason(&prompt, &Value::Array(batch.to_vec()))
            .await?;
        let mask = reasoning::boolean_mask(&response, batch.len())?;

        debug!(
            batch_len = batch.len(),
            kept = mask.iter().filter(|&&k| k).count(),
            "Filter batch evaluated"
        );
        for (item, keep) in batch.iter().zip(mask) {
            if keep {
                kept.push(item.clone());
            }
        }
    }

    info!(
        input = items.len(),
        kept = kept.len(),
        output_variable = %config.output_variable,
        "Filter completed"
    );
    state.record_detail(
        &node.id,
        StepStatus::Completed,
        None,
        Some(format!("kept {} of {}", kept.len(), items.len())),
    );
    state.set_variable(&config.output_variable, json!(kept));
    Ok(Flow::Next)
}

//! Deterministic boolean expression evaluation.
//!
//! Decision and assert nodes evaluate script expressions against the run's
//! variables. Evaluation is pure: same variables, same expression, same
//! answer. An expression that does not produce a boolean is an error, never
//! a guessed branch.

use std::collections::BTreeMap;

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Evaluate `expression` against the given variables, expecting a boolean.
///
/// Each variable is pushed into the script scope under its name, with `-`
/// replaced by `_` so workflow-style identifiers stay addressable.
pub fn eval_bool(expression: &str, variables: &BTreeMap<String, Value>) -> Result<bool> {
    let engine = Engine::new();
    let mut scope = Scope::new();

    for (name, value) in variables {
        let dynamic: Dynamic = rhai::serde::to_dynamic(value).map_err(|e| {
            Error::Execution(format!("Cannot bind variable '{}': {}", name, e))
        })?;
        scope.push_dynamic(name.replace('-', "_"), dynamic);
    }

    let result = engine
        .eval_expression_with_scope::<bool>(&mut scope, expression)
        .map_err(|e| {
            Error::Execution(format!("Condition '{}' failed to evaluate: {}", expression, e))
        })?;

    debug!(expression, result, "Evaluated condition");
    Ok(result)
}

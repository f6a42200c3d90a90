//! SOP document type definitions.
//!
//! A `WorkflowDocument` is the immutable definition of one SOP: a set of
//! typed nodes plus the directed edges between them. It is loaded once per
//! run and never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete SOP definition.
///
/// # Example YAML
///
/// ```yaml
/// name: invoice-approval
/// description: Approve pending invoices in the billing portal
///
/// prerequisites:
///   - billing-portal-tab
///
/// nodes:
///   - id: open-portal
///     kind: task
///     label: Open the billing portal
///     actions:
///       - type: navigate
///         target: https://billing.example.com/invoices
///
/// edges:
///   - source: open-portal
///     target: check-queue
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// Unique document name (used as identifier).
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Declared environment prerequisites (e.g., required browser tabs).
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Nodes (typed units of work) in document order.
    pub nodes: Vec<Node>,

    /// Directed transitions between nodes.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDocument {
    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Node kind. A closed set; every kind has exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Runs its actions strictly in order.
    Task,
    /// Grouping node; executes its children when marked to auto-expand.
    Compound,
    /// Evaluates a condition expression and branches on yes/no edges.
    Decision,
    /// Iterates a list variable, executing its children per element.
    Loop,
    /// Evaluates preconditions; any unmet condition fails the node.
    Assert,
    /// Partitions an array and keeps elements per a reasoning-provided mask.
    Filter,
    /// Produces derived content via the reasoning collaborator.
    Generator,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Compound => "compound",
            NodeKind::Decision => "decision",
            NodeKind::Loop => "loop",
            NodeKind::Assert => "assert",
            NodeKind::Filter => "filter",
            NodeKind::Generator => "generator",
        }
    }
}

/// A node in the SOP graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id within this document.
    pub id: String,

    /// Node kind.
    pub kind: NodeKind,

    /// Short human-readable label.
    #[serde(default)]
    pub label: String,

    /// What this step is trying to accomplish.
    #[serde(default)]
    pub intent: String,

    /// Extra operator context for this step.
    #[serde(default)]
    pub context: String,

    /// Declared actions (task nodes).
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Ordered child node ids (compound and loop nodes).
    #[serde(default)]
    pub children: Vec<String>,

    /// Iteration configuration (loop nodes).
    #[serde(default)]
    pub iterator: Option<IteratorConfig>,

    /// Retry policy applied to loop iteration bodies.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Precondition checks (assert nodes).
    #[serde(default)]
    pub assert_conditions: Vec<AssertCondition>,

    /// Condition expression (decision nodes). Must evaluate to a boolean.
    #[serde(default)]
    pub condition: Option<String>,

    /// Batch filter configuration (filter nodes).
    #[serde(default)]
    pub filter: Option<FilterConfig>,

    /// Content generation configuration (generator nodes).
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,

    /// Named credential requirements: service -> fields.
    #[serde(default)]
    pub credentials_required: BTreeMap<String, Vec<String>>,

    /// Whether a compound node executes its children (true) or acts as a
    /// pure grouping label (false).
    #[serde(default)]
    pub auto_expand: bool,
}

/// A directed transition between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,

    /// Optional branch tag.
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

/// Branch tags an edge may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Marks the document entry edge.
    Start,
    /// Decision branch when the condition holds.
    Yes,
    /// Decision branch when the condition does not hold.
    No,
    /// Loop re-entry edge within an iteration body.
    Next,
    /// Loop exit edge once the sequence is exhausted.
    AllProcessed,
}

/// One declared page-control action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action kind, dispatched to the page-control collaborator.
    #[serde(rename = "type")]
    pub action_type: ActionType,

    /// Selector or URL descriptor.
    #[serde(default)]
    pub target: Option<String>,

    /// Payload. String values may contain `{{service.field}}` credential
    /// placeholders, substituted just-in-time at dispatch.
    #[serde(default)]
    pub data: Value,

    /// Per-action timeout, enforced by the collaborator.
    #[serde(default = "default_action_timeout_ms")]
    pub timeout_ms: u64,

    /// Declared credential field this action consumes, if any.
    #[serde(default)]
    pub credential_field: Option<String>,

    /// Variable name to store this action's result under (extract actions).
    #[serde(default)]
    pub store_as: Option<String>,
}

fn default_action_timeout_ms() -> u64 {
    30_000
}

/// Page-control action kinds. A closed set; the dispatcher is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Click,
    Type,
    Wait,
    Extract,
    Screenshot,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Wait => "wait",
            ActionType::Extract => "extract",
            ActionType::Screenshot => "screenshot",
        }
    }
}

/// Retry policy for loop iteration bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per iteration body.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff schedule in milliseconds, indexed by attempts used.
    /// The last entry is reused if the schedule is shorter than needed.
    #[serde(default = "default_backoff_schedule")]
    pub backoff_schedule_ms: Vec<u64>,

    /// Whether consecutive iteration failures feed the circuit breaker.
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_schedule_ms: default_backoff_schedule(),
            circuit_breaker_enabled: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_schedule() -> Vec<u64> {
    vec![1_000, 2_000, 4_000]
}

fn default_true() -> bool {
    true
}

/// Iteration configuration for loop nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratorConfig {
    /// Variable holding the ordered input sequence.
    pub list_variable: String,

    /// Variable the current element is bound to.
    pub item_variable: String,

    /// Variable the current zero-based index is bound to.
    #[serde(default = "default_index_variable")]
    pub index_variable: String,

    /// Whether a failed iteration lets the loop proceed to the next item.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Hard iteration cap, independent of list length.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_index_variable() -> String {
    "index".to_string()
}

fn default_max_iterations() -> usize {
    100
}

/// One precondition check on an assert node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertCondition {
    /// Boolean expression over the run's variables.
    pub expression: String,

    /// Message reported when the condition does not hold.
    #[serde(default)]
    pub message: Option<String>,
}

/// Batch filter configuration for filter nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Variable holding the input array.
    pub input_variable: String,

    /// Variable the filtered subset is written to.
    pub output_variable: String,

    /// Items per reasoning batch. Batches are contiguous chunks; the
    /// engine never splits inside one.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Natural-language filter criteria passed to the reasoning collaborator.
    pub criteria: String,
}

fn default_batch_size() -> usize {
    10
}

/// Content generation configuration for generator nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Variable the generated content is written to.
    pub output_variable: String,

    /// Prompt template for the reasoning collaborator.
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_round_trip() {
        for kind in [
            NodeKind::Task,
            NodeKind::Compound,
            NodeKind::Decision,
            NodeKind::Loop,
            NodeKind::Assert,
            NodeKind::Filter,
            NodeKind::Generator,
        ] {
            let tag = serde_json::to_value(kind).unwrap();
            assert_eq!(tag, json!(kind.as_str()));
            let back: NodeKind = serde_json::from_value(tag).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_action_defaults() {
        let action: Action = serde_json::from_value(json!({
            "type": "click",
            "target": "#submit"
        }))
        .unwrap();
        assert_eq!(action.action_type, ActionType::Click);
        assert_eq!(action.timeout_ms, 30_000);
        assert!(action.store_as.is_none());
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy: RetryPolicy = serde_json::from_value(json!({})).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_schedule_ms, vec![1_000, 2_000, 4_000]);
        assert!(policy.circuit_breaker_enabled);
    }

    #[test]
    fn test_iterator_config_defaults() {
        let config: IteratorConfig = serde_json::from_value(json!({
            "list_variable": "invoices",
            "item_variable": "invoice"
        }))
        .unwrap();
        assert_eq!(config.index_variable, "index");
        assert_eq!(config.max_iterations, 100);
        assert!(!config.continue_on_error);
    }
}

//! Graph interpreter and run-control surface.
//!
//! The interpreter walks the resolved document graph one node at a time:
//! look up the current node, dispatch to its handler, follow the returned
//! flow to the next node. Pause and stop signals are honored between node
//! executions; a global step ceiling bounds every run regardless of graph
//! cycles. Failures never propagate past the control surface as errors:
//! they come back as a structured [`StepFailure`] with partial progress
//! preserved in the run's step history.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::credentials::{self, CredentialStore};
use crate::dispatch::ActionDispatcher;
use crate::error::{Error, Result, StepFailure};
use crate::handlers::{self, Flow, HandlerCtx};
use crate::reasoning::ReasoningClient;
use crate::state::{ExecutionState, RunStatus, StepStatus};
use crate::workflow::{validate_document, DocumentGraph, WorkflowDocument};

use super::signals::RunSignals;

/// One run: its mutable state plus the signal handle controllers use to
/// pause or stop it while [`Interpreter::start`] is in flight.
pub struct Run {
    pub state: ExecutionState,
    pub signals: RunSignals,
}

impl Run {
    /// Fresh run with a generated id.
    pub fn new() -> Self {
        Self {
            state: ExecutionState::new(Uuid::new_v4().to_string()),
            signals: RunSignals::new(),
        }
    }

    /// Rehydrate a run from a checkpoint. Signals start cleared.
    pub fn from_checkpoint(checkpoint: serde_json::Value) -> Result<Self> {
        Ok(Self {
            state: ExecutionState::restore(checkpoint)?,
            signals: RunSignals::new(),
        })
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}

/// Final report of a driven run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub steps_executed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

/// Report of a single externally driven node execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

/// Status snapshot returned by the pause/stop/skip controls.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlStatus {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_suggested_node_id: Option<String>,
}

/// Executes one document. Stateless across runs; all per-run state lives
/// in the [`Run`] handed to each call, so one interpreter can drive any
/// number of runs of the same document.
pub struct Interpreter {
    graph: DocumentGraph,
    dispatcher: Arc<dyn ActionDispatcher>,
    credentials: Arc<dyn CredentialStore>,
    reasoning: Arc<dyn ReasoningClient>,
    config: EngineConfig,
}

impl Interpreter {
    /// Validate and resolve a document into a ready interpreter.
    pub fn new(
        document: Arc<WorkflowDocument>,
        dispatcher: Arc<dyn ActionDispatcher>,
        credentials: Arc<dyn CredentialStore>,
        reasoning: Arc<dyn ReasoningClient>,
        config: EngineConfig,
    ) -> Result<Self> {
        validate_document(&document)?;
        let graph = DocumentGraph::resolve(document)?;
        Ok(Self {
            graph,
            dispatcher,
            credentials,
            reasoning,
            config,
        })
    }

    pub fn document(&self) -> &WorkflowDocument {
        self.graph.document()
    }

    /// Start (or continue) a run.
    ///
    /// A pending run is gated on credential validation first: every
    /// requirement in the document must resolve before any side effect,
    /// otherwise the run fails closed without a single dispatch. A paused
    /// run continues from its persisted current node.
    #[instrument(skip_all, fields(run_id = %run.state.run_id, document = %self.graph.document().name))]
    pub async fn start(&self, run: &mut Run) -> RunOutcome {
        if run.state.status == RunStatus::Pending {
            if let Err(e) = credentials::validate_all(self.graph.document(), self.credentials.as_ref()) {
                error!("Run refused: {}", e);
                run.state.status = RunStatus::Failed;
                return self.outcome(run, Some(StepFailure::from_error(&e, None)));
            }
            // A skip issued before the run started may already have
            // positioned it; only a blank run enters at the document entry.
            if run.state.current_node_id.is_none() {
                run.state.current_node_id = Some(self.graph.entry_node().id.clone());
            }
            info!(at = ?run.state.current_node_id, "Run started");
        } else {
            info!(status = %run.state.status, at = ?run.state.current_node_id, "Run continuing");
        }

        run.signals.clear_pause();
        run.state.status = RunStatus::Running;
        self.drive(run).await
    }

    /// Continue a run at an explicit node, overriding its persisted
    /// position. The target must exist in the document.
    #[instrument(skip_all, fields(run_id = %run.state.run_id, node_id))]
    pub async fn resume_at(&self, run: &mut Run, node_id: &str) -> RunOutcome {
        if let Err(e) = self.graph.node(node_id) {
            run.state.status = RunStatus::Failed;
            return self.outcome(run, Some(StepFailure::from_error(&e, Some(node_id))));
        }
        if let Err(e) = credentials::validate_all(self.graph.document(), self.credentials.as_ref()) {
            run.state.status = RunStatus::Failed;
            return self.outcome(run, Some(StepFailure::from_error(&e, None)));
        }

        run.state.current_node_id = Some(node_id.to_string());
        run.signals.clear_pause();
        run.state.status = RunStatus::Running;
        self.drive(run).await
    }

    async fn drive(&self, run: &mut Run) -> RunOutcome {
        let run_id = run.state.run_id.clone();

        loop {
            if run.signals.stop_requested() {
                return self.abort(run).await;
            }
            if run.signals.pause_requested() {
                info!(at = ?run.state.current_node_id, "Run paused");
                run.state.status = RunStatus::Paused;
                return self.outcome(run, None);
            }

            let Some(current) = run.state.current_node_id.clone() else {
                info!(steps = run.state.step_count, "Run completed");
                run.state.status = RunStatus::Completed;
                return self.outcome(run, None);
            };

            let node = match self.graph.node(&current) {
                Ok(node) => node,
                Err(e) => return self.fail(run, e, &current),
            };
            if let Err(e) = handlers::bump_step(&mut run.state, &self.config) {
                return self.fail(run, e, &current);
            }

            debug!(node_id = %current, kind = node.kind.as_str(), step = run.state.step_count, "Executing node");
            let ctx = HandlerCtx {
                graph: &self.graph,
                dispatcher: self.dispatcher.as_ref(),
                credentials: self.credentials.as_ref(),
                reasoning: self.reasoning.as_ref(),
                config: &self.config,
                signals: &run.signals,
                run_id: &run_id,
            };

            match handlers::run_node(&ctx, node, &mut run.state).await {
                Ok(Flow::Pause) => {
                    if run.signals.stop_requested() {
                        return self.abort(run).await;
                    }
                    info!(at = %current, "Run paused");
                    run.state.status = RunStatus::Paused;
                    return self.outcome(run, None);
                }
                Ok(flow) => {
                    let next = match flow {
                        Flow::Next => self.graph.next_default(&current).map(str::to_string),
                        Flow::Goto(target) => Some(target),
                        Flow::LoopExit => self.graph.loop_exit(&current).map(str::to_string),
                        Flow::Pause => None,
                    };
                    run.state.current_node_id = next;

                    if self.config.step_pacing_ms > 0 {
                        sleep(Duration::from_millis(self.config.step_pacing_ms)).await;
                    }
                }
                Err(e) => {
                    run.state.record_detail(
                        &current,
                        StepStatus::Failed,
                        None,
                        Some(e.to_string()),
                    );
                    return self.fail(run, e, &current);
                }
            }
        }
    }

    /// Execute exactly one node and report the suggested successor,
    /// leaving traversal to the caller.
    #[instrument(skip_all, fields(run_id = %run.state.run_id, node_id))]
    pub async fn execute_node_by_id(&self, run: &mut Run, node_id: &str) -> StepReport {
        let node = match self.graph.node(node_id) {
            Ok(node) => node,
            Err(e) => return StepReport::from_failure(&e, node_id),
        };
        if let Err(e) = handlers::bump_step(&mut run.state, &self.config) {
            return StepReport::from_failure(&e, node_id);
        }

        run.state.status = RunStatus::Running;
        run.state.current_node_id = Some(node_id.to_string());
        let run_id = run.state.run_id.clone();
        let ctx = HandlerCtx {
            graph: &self.graph,
            dispatcher: self.dispatcher.as_ref(),
            credentials: self.credentials.as_ref(),
            reasoning: self.reasoning.as_ref(),
            config: &self.config,
            signals: &run.signals,
            run_id: &run_id,
        };

        match handlers::run_node(&ctx, node, &mut run.state).await {
            Ok(Flow::Pause) => {
                run.state.status = RunStatus::Paused;
                StepReport {
                    success: true,
                    message: format!("Node '{}' paused", node_id),
                    next_node_id: Some(node_id.to_string()),
                    failure: None,
                }
            }
            Ok(flow) => {
                let next = match flow {
                    Flow::Next => self.graph.next_default(node_id).map(str::to_string),
                    Flow::Goto(target) => Some(target),
                    Flow::LoopExit => self.graph.loop_exit(node_id).map(str::to_string),
                    Flow::Pause => None,
                };
                run.state.current_node_id = next.clone();
                if next.is_none() {
                    run.state.status = RunStatus::Completed;
                }
                StepReport {
                    success: true,
                    message: format!("Node '{}' completed", node_id),
                    next_node_id: next,
                    failure: None,
                }
            }
            Err(e) => {
                run.state
                    .record_detail(node_id, StepStatus::Failed, None, Some(e.to_string()));
                run.state.status = RunStatus::Failed;
                StepReport::from_failure(&e, node_id)
            }
        }
    }

    /// Record a node as skipped and advance past it without executing.
    pub fn skip(&self, run: &mut Run, node_id: &str) -> Result<ControlStatus> {
        self.graph.node(node_id)?;
        run.state.record_detail(
            node_id,
            StepStatus::Skipped,
            None,
            Some("operator skip".to_string()),
        );
        let next = self.graph.next_default(node_id).map(str::to_string);
        run.state.current_node_id = next.clone();
        info!(node_id, next = ?next, "Node skipped");
        Ok(ControlStatus {
            status: run.state.status,
            next_suggested_node_id: next,
        })
    }

    /// Request a pause. A run in flight stops at the next node boundary;
    /// an idle run is marked paused directly.
    pub fn pause(&self, run: &mut Run) -> ControlStatus {
        run.signals.request_pause();
        if matches!(run.state.status, RunStatus::Pending | RunStatus::Running) {
            run.state.status = RunStatus::Paused;
        }
        ControlStatus {
            status: run.state.status,
            next_suggested_node_id: run.state.current_node_id.clone(),
        }
    }

    /// Request an abort and release the dispatcher's session. A run in
    /// flight aborts at the next node boundary.
    pub async fn stop(&self, run: &mut Run) -> ControlStatus {
        run.signals.request_stop();
        if !matches!(run.state.status, RunStatus::Completed | RunStatus::Failed) {
            run.state.status = RunStatus::Aborted;
        }
        self.dispatcher.release().await;
        ControlStatus {
            status: run.state.status,
            next_suggested_node_id: run.state.current_node_id.clone(),
        }
    }

    async fn abort(&self, run: &mut Run) -> RunOutcome {
        info!(at = ?run.state.current_node_id, "Run aborted");
        run.state.status = RunStatus::Aborted;
        self.dispatcher.release().await;
        self.outcome(run, None)
    }

    fn fail(&self, run: &mut Run, error: Error, current: &str) -> RunOutcome {
        error!(code = error.code(), node_id = %current, "Run failed: {}", error);
        run.state.status = RunStatus::Failed;
        self.outcome(run, Some(StepFailure::from_error(&error, Some(current))))
    }

    fn outcome(&self, run: &Run, failure: Option<StepFailure>) -> RunOutcome {
        RunOutcome {
            run_id: run.state.run_id.clone(),
            status: run.state.status,
            steps_executed: run.state.step_count,
            failure,
        }
    }
}

impl StepReport {
    fn from_failure(error: &Error, node_id: &str) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            next_node_id: None,
            failure: Some(StepFailure::from_error(error, Some(node_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{InjectedAction, MemoryCredentialStore};
    use crate::dispatch::{ActionOutput, DispatchContext};
    use crate::workflow::parse_document;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted dispatcher: per-node success plans and extract payloads,
    /// plus an optional pause trigger after N total dispatches.
    #[derive(Default)]
    struct StubDispatcher {
        calls: Mutex<Vec<String>>,
        /// Per-node queue of success flags; an exhausted queue succeeds.
        plans: Mutex<HashMap<String, VecDeque<bool>>>,
        /// Per-node payload returned on successful dispatches.
        responses: Mutex<HashMap<String, Value>>,
        pause_after: Mutex<Option<(usize, RunSignals)>>,
        released: AtomicBool,
    }

    impl StubDispatcher {
        fn plan(&self, node_id: &str, successes: &[bool]) {
            self.plans
                .lock()
                .unwrap()
                .insert(node_id.to_string(), successes.iter().copied().collect());
        }

        fn respond(&self, node_id: &str, data: Value) {
            self.responses
                .lock()
                .unwrap()
                .insert(node_id.to_string(), data);
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ActionDispatcher for StubDispatcher {
        async fn dispatch(
            &self,
            _action: &InjectedAction,
            ctx: &DispatchContext,
        ) -> crate::error::Result<ActionOutput> {
            let total = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(ctx.node_id.clone());
                calls.len()
            };
            if let Some((after, signals)) = &*self.pause_after.lock().unwrap() {
                if total >= *after {
                    signals.request_pause();
                }
            }

            let succeed = self
                .plans
                .lock()
                .unwrap()
                .get_mut(&ctx.node_id)
                .and_then(|plan| plan.pop_front())
                .unwrap_or(true);
            if !succeed {
                return Ok(ActionOutput::failed("scripted failure"));
            }

            let data = self.responses.lock().unwrap().get(&ctx.node_id).cloned();
            Ok(ActionOutput::ok(data))
        }

        async fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Returns queued values in order; an unexpected call is an error.
    #[derive(Default)]
    struct ScriptedReasoning {
        outputs: Mutex<VecDeque<Value>>,
    }

    impl ScriptedReasoning {
        fn with(outputs: &[Value]) -> Self {
            Self {
                outputs: Mutex::new(outputs.iter().cloned().collect()),
            }
        }
    }

    #[async_trait]
    impl crate::reasoning::ReasoningClient for ScriptedReasoning {
        async fn reason(&self, _prompt: &str, _input: &Value) -> crate::error::Result<Value> {
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Reasoning("unexpected reasoning call".into()))
        }
    }

    struct Fixture {
        interpreter: Interpreter,
        dispatcher: Arc<StubDispatcher>,
    }

    fn fixture(yaml: &str) -> Fixture {
        fixture_full(yaml, ScriptedReasoning::default(), MemoryCredentialStore::new(), EngineConfig::default())
    }

    fn fixture_full(
        yaml: &str,
        reasoning: ScriptedReasoning,
        store: MemoryCredentialStore,
        config: EngineConfig,
    ) -> Fixture {
        let document = Arc::new(parse_document(yaml).unwrap());
        let dispatcher = Arc::new(StubDispatcher::default());
        let interpreter = Interpreter::new(
            document,
            dispatcher.clone(),
            Arc::new(store),
            Arc::new(reasoning),
            config,
        )
        .unwrap();
        Fixture {
            interpreter,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let f = fixture(
            r##"
name: linear
nodes:
  - id: a
    kind: task
    actions: [{type: navigate, target: "https://example.com"}]
  - id: b
    kind: task
    actions: [{type: click, target: "#go"}]
edges:
  - source: a
    target: b
"##,
        );
        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.steps_executed, 2);
        assert!(outcome.failure.is_none());
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_credentials_block_run_before_any_dispatch() {
        let f = fixture(
            r##"
name: gated
nodes:
  - id: login
    kind: task
    actions:
      - type: type
        target: "#password"
        data: "{{ crm.password }}"
"##,
        );
        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failure.unwrap().code, "CREDENTIAL_MISSING");
        assert_eq!(f.dispatcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_decision_branches_on_extracted_variable() {
        let f = fixture(
            r##"
name: branching
nodes:
  - id: fetch
    kind: task
    actions: [{type: extract, target: ".count", store_as: count}]
  - id: choose
    kind: decision
    condition: "count > 3"
  - id: many
    kind: task
    actions: [{type: click, target: "#bulk"}]
  - id: few
    kind: task
    actions: [{type: click, target: "#single"}]
edges:
  - source: fetch
    target: choose
  - source: choose
    target: many
    condition: "yes"
  - source: choose
    target: few
    condition: "no"
"##,
        );
        f.dispatcher.respond("fetch", json!(5));

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["fetch", "many"]);
    }

    #[tokio::test]
    async fn test_task_stops_at_first_failed_action() {
        let f = fixture(
            r##"
name: three-actions
nodes:
  - id: form
    kind: task
    actions:
      - {type: click, target: "#open"}
      - {type: type, target: "#name", data: "Ada"}
      - {type: click, target: "#submit"}
"##,
        );
        f.dispatcher.plan("form", &[true, false]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.code, "ACTION_FAILURE");
        assert_eq!(failure.step_id.as_deref(), Some("form"));
        // Exactly two dispatch attempts; the third action never went out.
        assert_eq!(run.state.dispatch_attempts("form"), 2);
        assert_eq!(f.dispatcher.call_count(), 2);
    }

    fn loop_yaml(continue_on_error: bool, max_attempts: u32) -> String {
        format!(
            r##"
name: looping
nodes:
  - id: seed
    kind: task
    actions: [{{type: extract, target: ".rows", store_as: rows}}]
  - id: each
    kind: loop
    children: [handle]
    iterator:
      list_variable: rows
      item_variable: row
      continue_on_error: {continue_on_error}
    retry:
      max_attempts: {max_attempts}
      backoff_schedule_ms: [1]
  - id: handle
    kind: task
    actions: [{{type: click, target: "#row"}}]
  - id: done
    kind: task
    actions: [{{type: screenshot}}]
edges:
  - source: seed
    target: each
  - source: each
    target: done
    condition: all_processed
"##
        )
    }

    #[tokio::test]
    async fn test_loop_aborts_on_first_exhausted_iteration_by_default() {
        let f = fixture(&loop_yaml(false, 1));
        f.dispatcher.respond("seed", json!(["a", "b", "c"]));
        f.dispatcher.plan("handle", &[false]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.code, "ITERATION_FAILURE");
        assert_eq!(failure.attempt, Some(1));
        // One body dispatch, then the run halted; "done" never ran.
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["seed", "handle"]);
    }

    #[tokio::test]
    async fn test_loop_continue_on_error_processes_remaining_items() {
        let f = fixture(&loop_yaml(true, 1));
        f.dispatcher.respond("seed", json!(["a", "b", "c"]));
        f.dispatcher.plan("handle", &[false, true, true]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            *f.dispatcher.calls.lock().unwrap(),
            vec!["seed", "handle", "handle", "handle", "done"]
        );
        let record = run
            .state
            .step_history
            .iter()
            .rev()
            .find(|r| r.node_id == "each" && r.status == StepStatus::Completed)
            .unwrap();
        assert_eq!(record.detail.as_deref(), Some("processed 2 of 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_retries_then_succeeds() {
        let f = fixture(&loop_yaml(false, 3));
        f.dispatcher.respond("seed", json!(["only"]));
        f.dispatcher.plan("handle", &[false, false, true]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(run.state.dispatch_attempts("handle"), 3);
    }

    #[tokio::test]
    async fn test_circuit_breaker_halts_loop_early() {
        let f = fixture(&loop_yaml(true, 1));
        f.dispatcher.respond("seed", json!(["a", "b", "c", "d", "e", "f"]));
        f.dispatcher.plan("handle", &[false; 10]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        // Three consecutive exhausted iterations trip the breaker; the
        // loop halts early but the run itself proceeds past it.
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(run.state.dispatch_attempts("handle"), 3);
        assert!(run
            .state
            .step_history
            .iter()
            .any(|r| r.detail.as_deref() == Some("circuit breaker tripped")));
    }

    #[tokio::test]
    async fn test_circuit_breaker_resets_on_success() {
        let f = fixture(&loop_yaml(true, 1));
        f.dispatcher.respond("seed", json!(["a", "b", "c", "d", "e"]));
        // fail, ok, fail, fail, ok: never three consecutive failures.
        f.dispatcher.plan("handle", &[false, true, false, false, true]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(run.state.dispatch_attempts("handle"), 5);
    }

    #[tokio::test]
    async fn test_iteration_cap_bounds_processing() {
        let yaml = r##"
name: capped
nodes:
  - id: seed
    kind: task
    actions: [{type: extract, target: ".rows", store_as: rows}]
  - id: each
    kind: loop
    children: [handle]
    iterator:
      list_variable: rows
      item_variable: row
      max_iterations: 2
  - id: handle
    kind: task
    actions: [{type: click, target: "#row"}]
edges:
  - source: seed
    target: each
"##;
        let f = fixture(yaml);
        f.dispatcher.respond("seed", json!([1, 2, 3, 4, 5]));

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(run.state.dispatch_attempts("handle"), 2);
    }

    #[tokio::test]
    async fn test_step_ceiling_halts_cyclic_graph() {
        let yaml = r##"
name: cyclic
nodes:
  - id: work
    kind: task
    actions: [{type: wait}]
  - id: again
    kind: decision
    condition: "true"
edges:
  - source: work
    target: again
  - source: again
    target: work
    condition: "yes"
  - source: again
    target: work
    condition: "no"
"##;
        let config = EngineConfig {
            max_steps: 10,
            ..EngineConfig::default()
        };
        let f = fixture_full(
            yaml,
            ScriptedReasoning::default(),
            MemoryCredentialStore::new(),
            config,
        );

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failure.unwrap().code, "SAFETY_LIMIT_EXCEEDED");
        assert_eq!(run.state.step_count, 10);
    }

    #[tokio::test]
    async fn test_pause_mid_loop_then_resume_processes_each_item_once() {
        let f = fixture(&loop_yaml(false, 1));
        f.dispatcher.respond("seed", json!(["a", "b", "c", "d", "e"]));

        let mut run = Run::new();
        *f.dispatcher.pause_after.lock().unwrap() = Some((3, run.signals.clone()));

        let outcome = f.interpreter.start(&mut run).await;
        assert_eq!(outcome.status, RunStatus::Paused);
        // seed + items 1 and 2; the pause request landed during item 2
        // and took effect at the iteration boundary.
        assert_eq!(f.dispatcher.call_count(), 3);

        let checkpoint = run.state.checkpoint().unwrap();
        let mut resumed = Run::from_checkpoint(checkpoint).unwrap();
        *f.dispatcher.pause_after.lock().unwrap() = None;

        let outcome = f.interpreter.start(&mut resumed).await;
        assert_eq!(outcome.status, RunStatus::Completed);
        // History carried over the checkpoint: 2 attempts before the
        // pause, items 3-5 exactly once each after it, then "done".
        assert_eq!(resumed.state.dispatch_attempts("handle"), 5);
        assert_eq!(f.dispatcher.call_count(), 7);
    }

    #[tokio::test]
    async fn test_stop_before_start_aborts_without_dispatch() {
        let f = fixture(
            r##"
name: stopped
nodes:
  - id: a
    kind: task
    actions: [{type: wait}]
"##,
        );
        let mut run = Run::new();
        run.signals.request_stop();

        let outcome = f.interpreter.start(&mut run).await;
        assert_eq!(outcome.status, RunStatus::Aborted);
        assert_eq!(f.dispatcher.call_count(), 0);
        assert!(f.dispatcher.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_filter_coerces_object_shaped_input() {
        let yaml = r##"
name: filtering
nodes:
  - id: fetch
    kind: task
    actions: [{type: extract, target: ".rows", store_as: rows}]
  - id: sift
    kind: filter
    filter:
      input_variable: rows
      output_variable: kept
      criteria: "rows that need review"
edges:
  - source: fetch
    target: sift
"##;
        let f = fixture_full(
            yaml,
            ScriptedReasoning::with(&[json!([true, false, true])]),
            MemoryCredentialStore::new(),
            EngineConfig::default(),
        );
        // Object-shaped where an array belongs; must coerce, not fail.
        f.dispatcher
            .respond("fetch", json!({"0": "a", "1": "b", "2": "c"}));

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(run.state.get_variable("kept"), Some(&json!(["a", "c"])));
    }

    #[tokio::test]
    async fn test_filter_bad_mask_fails_run() {
        let yaml = r##"
name: filtering
nodes:
  - id: fetch
    kind: task
    actions: [{type: extract, target: ".rows", store_as: rows}]
  - id: sift
    kind: filter
    filter:
      input_variable: rows
      output_variable: kept
      criteria: "rows that need review"
edges:
  - source: fetch
    target: sift
"##;
        // Mask too short for the batch.
        let f = fixture_full(
            yaml,
            ScriptedReasoning::with(&[json!([true])]),
            MemoryCredentialStore::new(),
            EngineConfig::default(),
        );
        f.dispatcher.respond("fetch", json!(["a", "b", "c"]));

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failure.unwrap().code, "REASONING_ERROR");
    }

    #[tokio::test]
    async fn test_generator_stores_output_variable() {
        let yaml = r##"
name: generating
nodes:
  - id: summarize
    kind: generator
    generator:
      output_variable: summary
      prompt: "Summarize the processed rows"
"##;
        let f = fixture_full(
            yaml,
            ScriptedReasoning::with(&[json!("two rows approved")]),
            MemoryCredentialStore::new(),
            EngineConfig::default(),
        );

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(
            run.state.get_variable("summary"),
            Some(&json!("two rows approved"))
        );
    }

    #[tokio::test]
    async fn test_assert_failure_is_not_retried() {
        let yaml = r##"
name: asserting
nodes:
  - id: fetch
    kind: task
    actions: [{type: extract, target: ".status", store_as: status}]
  - id: guard
    kind: assert
    assert_conditions:
      - expression: "status == \"ready\""
        message: "portal is not ready"
edges:
  - source: fetch
    target: guard
"##;
        let f = fixture(yaml);
        f.dispatcher.respond("fetch", json!("maintenance"));

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.code, "ASSERTION_FAILED");
        assert!(failure.details.contains("portal is not ready"));
    }

    #[tokio::test]
    async fn test_compound_auto_expand_runs_children_in_order() {
        let yaml = r##"
name: grouped
nodes:
  - id: group
    kind: compound
    auto_expand: true
    children: [first, second]
  - id: first
    kind: task
    actions: [{type: click, target: "#one"}]
  - id: second
    kind: task
    actions: [{type: click, target: "#two"}]
"##;
        let f = fixture(yaml);
        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_skip_advances_past_node() {
        let f = fixture(
            r##"
name: skipping
nodes:
  - id: a
    kind: task
    actions: [{type: wait}]
  - id: b
    kind: task
    actions: [{type: click, target: "#go"}]
edges:
  - source: a
    target: b
"##,
        );
        let mut run = Run::new();
        let status = f.interpreter.skip(&mut run, "a").unwrap();

        assert_eq!(status.next_suggested_node_id.as_deref(), Some("b"));
        assert!(run
            .state
            .step_history
            .iter()
            .any(|r| r.node_id == "a" && r.status == StepStatus::Skipped));

        let outcome = f.interpreter.start(&mut run).await;
        assert_eq!(outcome.status, RunStatus::Completed);
        // The skipped node was never dispatched.
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_execute_node_by_id_reports_successor() {
        let f = fixture(
            r##"
name: stepping
nodes:
  - id: a
    kind: task
    actions: [{type: wait}]
  - id: b
    kind: task
    actions: [{type: click, target: "#go"}]
edges:
  - source: a
    target: b
"##,
        );
        let mut run = Run::new();

        let report = f.interpreter.execute_node_by_id(&mut run, "a").await;
        assert!(report.success);
        assert_eq!(report.next_node_id.as_deref(), Some("b"));

        let report = f.interpreter.execute_node_by_id(&mut run, "b").await;
        assert!(report.success);
        assert!(report.next_node_id.is_none());
        assert_eq!(run.state.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_execute_unknown_node_reports_failure() {
        let f = fixture(
            r##"
name: stepping
nodes:
  - id: a
    kind: task
    actions: [{type: wait}]
"##,
        );
        let mut run = Run::new();
        let report = f.interpreter.execute_node_by_id(&mut run, "ghost").await;
        assert!(!report.success);
        assert_eq!(report.failure.unwrap().code, "EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn test_resume_at_overrides_position() {
        let f = fixture(
            r##"
name: resuming
nodes:
  - id: a
    kind: task
    actions: [{type: wait}]
  - id: b
    kind: task
    actions: [{type: click, target: "#go"}]
edges:
  - source: a
    target: b
"##,
        );
        let mut run = Run::new();
        let outcome = f.interpreter.resume_at(&mut run, "b").await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_inner_loop_restarts_under_tolerant_outer_loop() {
        let f = fixture(
            r##"
name: batching
nodes:
  - id: seed
    kind: task
    actions: [{type: extract, target: ".groups", store_as: groups}]
  - id: groups-loop
    kind: loop
    children: [entries-loop]
    iterator:
      list_variable: groups
      item_variable: group
      index_variable: group_index
      continue_on_error: true
    retry:
      max_attempts: 1
      backoff_schedule_ms: [1]
  - id: entries-loop
    kind: loop
    children: [handle]
    iterator:
      list_variable: group
      item_variable: entry
    retry:
      max_attempts: 1
      backoff_schedule_ms: [1]
  - id: handle
    kind: task
    actions: [{type: click, target: "#entry"}]
  - id: done
    kind: task
    actions: [{type: screenshot}]
edges:
  - source: seed
    target: groups-loop
  - source: groups-loop
    target: done
    condition: all_processed
"##,
        );
        f.dispatcher
            .respond("seed", json!([["a1", "a2", "a3"], ["b1", "b2", "b3"]]));
        // Third entry of the first group fails; everything else succeeds.
        f.dispatcher
            .plan("handle", &[true, true, false, true, true, true]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        // The failed inner loop discarded its iteration frame, so the
        // second group's inner loop starts from its first entry instead
        // of resuming at the stale index: six body dispatches in total.
        assert_eq!(run.state.dispatch_attempts("handle"), 6);

        let inner_completions: Vec<_> = run
            .state
            .step_history
            .iter()
            .filter(|r| r.node_id == "entries-loop" && r.status == StepStatus::Completed)
            .collect();
        assert_eq!(inner_completions.len(), 1);
        assert_eq!(
            inner_completions[0].detail.as_deref(),
            Some("processed 3 of 3")
        );

        let outer = run
            .state
            .step_history
            .iter()
            .rev()
            .find(|r| r.node_id == "groups-loop" && r.status == StepStatus::Completed)
            .unwrap();
        assert_eq!(outer.detail.as_deref(), Some("processed 1 of 2"));
    }

    #[tokio::test]
    async fn test_strict_loop_aborts_even_with_hair_trigger_breaker() {
        let config = EngineConfig {
            breaker_threshold: 1,
            ..EngineConfig::default()
        };
        let f = fixture_full(
            &loop_yaml(false, 1),
            ScriptedReasoning::default(),
            MemoryCredentialStore::new(),
            config,
        );
        f.dispatcher.respond("seed", json!(["a", "b", "c"]));
        f.dispatcher.plan("handle", &[false]);

        let mut run = Run::new();
        let outcome = f.interpreter.start(&mut run).await;

        // A tripped breaker never outranks the strict failure mode: the
        // run aborts instead of completing with the loop halted early.
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failure.unwrap().code, "ITERATION_FAILURE");
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec!["seed", "handle"]);
    }
}

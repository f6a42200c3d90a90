//! # soprun
//!
//! An execution engine for SOP (standard operating procedure) documents:
//! human-authored workflows automated against business web applications.
//! A document is a typed node graph; the engine walks it deterministically,
//! dispatching page-control actions through an external collaborator and
//! delegating judgement calls (filtering, content generation) to an
//! external reasoning collaborator.
//!
//! ## Architecture
//!
//! - [`workflow`]: document types, YAML parsing, validation, and graph
//!   resolution
//! - [`engine`]: the interpreter loop, retry/circuit-breaker policy, and
//!   pause/stop signals
//! - [`handlers`]: one handler per node kind (task, compound, decision,
//!   loop, assert, filter, generator)
//! - [`state`]: per-run execution state with checkpoint/restore
//! - [`credentials`]: requirement scanning and just-in-time secret
//!   injection with wipe-after-dispatch
//! - [`dispatch`]: the action dispatcher boundary
//! - [`reasoning`]: the reasoning collaborator boundary and output
//!   coercion rules
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use soprun::config::EngineConfig;
//! use soprun::engine::{Interpreter, Run};
//! use soprun::workflow::parse_document_file;
//! # use soprun::credentials::MemoryCredentialStore;
//! # use soprun::dispatch::ActionDispatcher;
//! # use soprun::reasoning::ReasoningClient;
//!
//! # async fn example(
//! #     dispatcher: Arc<dyn ActionDispatcher>,
//! #     reasoning: Arc<dyn ReasoningClient>,
//! # ) -> soprun::Result<()> {
//! let document = Arc::new(parse_document_file("invoice-approval.yaml")?);
//! let interpreter = Interpreter::new(
//!     document,
//!     dispatcher,
//!     Arc::new(MemoryCredentialStore::new()),
//!     reasoning,
//!     EngineConfig::from_env(),
//! )?;
//!
//! let mut run = Run::new();
//! let outcome = interpreter.start(&mut run).await;
//! println!("{}: {}", outcome.run_id, outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod reasoning;
pub mod state;
pub mod workflow;

pub use error::{Error, Result};

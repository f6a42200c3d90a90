//! Execution engine: the graph interpreter, iteration retry policy, and
//! run control signals.

pub mod interpreter;
pub mod retry;
pub mod signals;

pub use interpreter::{ControlStatus, Interpreter, Run, RunOutcome, StepReport};
pub use signals::RunSignals;

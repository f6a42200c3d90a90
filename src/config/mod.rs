//! Engine configuration.
//!
//! Configuration comes from environment variables (`SOPRUN_*`) or is
//! supplied directly by the embedding host.

use serde::{Deserialize, Serialize};

/// Engine configuration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global step ceiling per run. Exceeding it halts the run with a
    /// reported safety-limit failure regardless of graph cycles.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Deliberate pacing delay between node executions, in milliseconds.
    /// Observability/rate-limit affordance, not a correctness requirement.
    #[serde(default)]
    pub step_pacing_ms: u64,

    /// Consecutive iteration failures that trip a loop's circuit breaker.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_pacing_ms: 0,
            breaker_threshold: default_breaker_threshold(),
        }
    }
}

fn default_max_steps() -> u64 {
    500
}

fn default_breaker_threshold() -> u32 {
    3
}

impl EngineConfig {
    /// Load configuration from `SOPRUN_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("SOPRUN_MAX_STEPS") {
            config.max_steps = v;
        }
        if let Some(v) = env_parse("SOPRUN_STEP_PACING_MS") {
            config.step_pacing_ms = v;
        }
        if let Some(v) = env_parse("SOPRUN_BREAKER_THRESHOLD") {
            config.breaker_threshold = v;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Initialize tracing with an env-filter layer.
///
/// Reads `SOPRUN_LOG` (falling back to `RUST_LOG`, then "info"). Safe to
/// call once per process; embedding hosts with their own subscriber should
/// skip this.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = std::env::var("SOPRUN_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .try_init();
}

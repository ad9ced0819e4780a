//! Agentune - adaptive optimization core for multi-agent workflow
//! orchestration.
//!
//! This crate wires the learning, analytics and tuning layers around one
//! shared [`LearningStore`](agentune_storage::LearningStore):
//!
//! ```text
//! Orchestrator ─▶ MlOptimizer ─────────────┐
//!              ─▶ PredictiveAnalyticsEngine ├─▶ LearningStore
//! Monitor      ─▶ AutoTuner ───────────────┘
//! ```

#![warn(missing_docs)]

pub mod settings;
pub mod runtime;

pub use settings::Settings;
pub use runtime::{Agentune, WorkflowAssessment};

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! Agentune core data models.
//!
//! This crate defines the shared vocabulary of the adaptive optimization
//! core: workflow snapshots, reinforcement-learning experiences, tunable
//! parameter spaces, live telemetry and the common error type.

#![warn(missing_docs)]

// Core identities
mod id;

// Errors
mod error;

// Workflow snapshots and experiences
mod workflow;

// Tunable parameters
mod space;

// Live telemetry
mod telemetry;

// Randomness
mod rng;

// Re-exports
pub use id::*;
pub use error::{AgentuneError, Result};
pub use workflow::{
    Episode, Experience, StateKey, WorkflowData, WorkflowState, FEATURE_NAMES,
};
pub use space::{
    config_distance, interpolate_configs, Configuration, ParamValue, ParameterKind,
    ParameterSpace, ParameterSpec,
};
pub use telemetry::{Metrics, PerformanceMonitor, PerformanceStats};
pub use rng::seeded_rng;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

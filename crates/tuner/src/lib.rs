//! Tuning layer - live configuration search against performance telemetry.

#![warn(missing_docs)]

pub mod strategy;
pub mod grid;
pub mod genetic;
pub mod annealing;
pub mod bandit;
pub mod objective;
pub mod tuner;

pub use strategy::{BayesianSearch, SearchStrategy, StrategyKind};
pub use grid::GridSearch;
pub use genetic::{GeneticConfig, GeneticSearch, Individual};
pub use annealing::{AnnealingConfig, AnnealingSearch};
pub use bandit::{Arm, BanditConfig, BanditSearch};
pub use objective::{score_stats, ObjectiveWeights};
pub use tuner::{
    AutoTuner, ConfigurationSink, IterationOutcome, IterationRecord, StopHandle, TunerConfig, TuningReport,
    TuningRun, TuningStatus, BEST_CONFIG_KEY,
};

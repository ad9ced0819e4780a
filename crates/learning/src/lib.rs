//! Learning layer - reinforcement learning, transfer, multi-task models,
//! Bayesian search, model versioning and attribution.

#![warn(missing_docs)]

pub mod qlearning;
pub mod transfer;
pub mod multitask;
pub mod bayesian;
pub mod versioning;
pub mod explain;
pub mod optimizer;

pub use qlearning::{QEntry, QLearningAgent, QLearningConfig, QLearningSnapshot, QTable};
pub use transfer::{DomainMetadata, SourceModel, TransferConfig, TransferLearningEngine, TransferredModel};
pub use multitask::{MultiTaskLearner, TaskHead};
pub use bayesian::{BayesianConfig, BayesianOptimizer, Observation};
pub use versioning::{
    AbTest, AbTestResults, AbTestStatus, ModelVersion, ModelVersionManager, Outcome, VersionStats,
    VersionSummary, VersioningConfig,
};
pub use explain::{Direction, ExplainConfig, ExplainableAI, Explanation, Factor, ShapValues};
pub use optimizer::{
    AgentCandidate, MlOptimizer, MlOptimizerConfig, SelectionResult, SuccessPrediction, TrainingSummary,
    MIN_MULTITASK_STEPS, QTABLE_KEY, SUCCESS_TASK,
};

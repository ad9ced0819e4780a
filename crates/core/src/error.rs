//! Error type shared by all Agentune components.

/// Result alias for Agentune operations.
pub type Result<T> = std::result::Result<T, AgentuneError>;

/// Errors raised by the optimization core.
///
/// These are usage and configuration errors. Missing history is never an
/// error; components degrade to defined defaults instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentuneError {
    /// An operation was called before `initialize()`
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    /// A parameter specification or configuration violates its bounds
    #[error("invalid bounds for '{param}': {reason}")]
    InvalidBounds {
        /// Parameter name
        param: String,
        /// What is wrong
        reason: String,
    },

    /// Malformed input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown source model or domain
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Unknown model version
    #[error("unknown version: {0}")]
    UnknownVersion(String),

    /// Unknown A/B test
    #[error("unknown A/B test: {0}")]
    UnknownTest(String),

    /// Unknown task head
    #[error("unknown task head: {0}")]
    UnknownTask(String),

    /// Task head registered twice
    #[error("task head already exists: {0}")]
    DuplicateTaskHead(String),

    /// Model version registered twice
    #[error("version already registered: {0}")]
    DuplicateVersion(String),

    /// A/B test started twice
    #[error("A/B test already exists: {0}")]
    DuplicateTest(String),

    /// Selection was asked to choose from nothing
    #[error("no candidates to choose from")]
    EmptyCandidates,

    /// Not enough samples to build a baseline
    #[error("insufficient samples: need {needed}, got {got}")]
    InsufficientSamples {
        /// Minimum required
        needed: usize,
        /// Provided
        got: usize,
    },

    /// Operation not valid in the current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Persistence failure reported by the learning store
    #[error("storage error: {0}")]
    Storage(String),
}

//! Unique identifiers for Agentune entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a genetic-search individual.
///
/// Every crossover or mutation produces a fresh identity, so lineage can be
/// told apart even when two configurations happen to be equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndividualId(Ulid);

impl IndividualId {
    /// Generate a new IndividualId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for IndividualId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IndividualId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for IndividualId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a tuning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

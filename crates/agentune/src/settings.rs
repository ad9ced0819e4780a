//! Settings for the whole optimization core.

use agentune_analytics::AnalyticsConfig;
use agentune_learning::MlOptimizerConfig;
use agentune_tuner::TunerConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Nested component settings, loadable from JSON.
///
/// Every section and field is optional; missing values take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ML optimizer settings
    pub learning: MlOptimizerConfig,
    /// Analytics engine settings
    pub analytics: AnalyticsConfig,
    /// Auto-tuner settings
    pub tuner: TunerConfig,
}

impl Settings {
    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings")
    }

    /// Read settings from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Seed every component.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.learning.seed = Some(seed);
        self.analytics.seed = Some(seed);
        self.tuner.seed = Some(seed);
        self
    }
}

//! UCB1 bandit over a fixed set of candidate configurations.

use crate::{SearchStrategy, StrategyKind};
use agentune_core::{Configuration, ParameterSpace};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Bandit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    /// Arms drawn when none are supplied (the center point plus random samples)
    pub arms: usize,
    /// UCB exploration coefficient
    pub exploration: f64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            arms: 8,
            exploration: std::f64::consts::SQRT_2,
        }
    }
}

/// One candidate configuration and its reward record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    /// Configuration played by this arm
    pub config: Configuration,
    /// Times played
    pub pulls: u64,
    /// Sum of observed rewards
    pub total_reward: f64,
}

impl Arm {
    fn new(config: Configuration) -> Self {
        Self {
            config,
            pulls: 0,
            total_reward: 0.0,
        }
    }

    /// Average reward, 0 when never played.
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            0.0
        } else {
            self.total_reward / self.pulls as f64
        }
    }
}

/// UCB1 multi-armed bandit.
pub struct BanditSearch {
    config: BanditConfig,
    arms: Vec<Arm>,
    total_pulls: u64,
    pending: Option<usize>,
}

impl BanditSearch {
    /// Create a bandit; arms are drawn on the first proposal.
    pub fn new(config: BanditConfig) -> Self {
        Self {
            config,
            arms: Vec::new(),
            total_pulls: 0,
            pending: None,
        }
    }

    /// Use explicit arms instead of sampled ones.
    pub fn with_arms(mut self, configs: impl IntoIterator<Item = Configuration>) -> Self {
        self.arms = configs.into_iter().map(Arm::new).collect();
        self
    }

    /// Current arms.
    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    /// Arm with the highest upper confidence bound; untried arms first.
    pub fn select_arm_ucb1(&self) -> Option<usize> {
        if let Some(untried) = self.arms.iter().position(|a| a.pulls == 0) {
            return Some(untried);
        }
        let ln_total = (self.total_pulls.max(1) as f64).ln();
        self.arms
            .iter()
            .enumerate()
            .map(|(i, arm)| {
                let bonus = self.config.exploration * (ln_total / arm.pulls as f64).sqrt();
                (i, arm.mean_reward() + bonus)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Arm with the best mean reward among those played.
    pub fn best_arm(&self) -> Option<&Arm> {
        self.arms
            .iter()
            .filter(|a| a.pulls > 0)
            .max_by(|a, b| a.mean_reward().total_cmp(&b.mean_reward()))
    }
}

impl SearchStrategy for BanditSearch {
    fn name(&self) -> &'static str {
        StrategyKind::Bandit.as_str()
    }

    fn propose(&mut self, space: &ParameterSpace, rng: &mut StdRng) -> Option<Configuration> {
        if self.arms.is_empty() {
            let count = self.config.arms.max(1);
            self.arms.push(Arm::new(space.center()));
            while self.arms.len() < count {
                self.arms.push(Arm::new(space.sample(rng)));
            }
        }
        let arm = self.select_arm_ucb1()?;
        self.pending = Some(arm);
        Some(space.clamp(&self.arms[arm].config))
    }

    fn observe(&mut self, _config: &Configuration, score: f64) {
        let Some(arm) = self.pending.take().and_then(|i| self.arms.get_mut(i)) else {
            return;
        };
        arm.pulls += 1;
        if score.is_finite() {
            arm.total_reward += score;
        }
        self.total_pulls += 1;
    }
}

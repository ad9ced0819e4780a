//! Search strategies over a parameter space.

use crate::{AnnealingSearch, BanditSearch, GeneticSearch, GridSearch, TunerConfig};
use agentune_core::{Configuration, ParameterSpace};
use agentune_learning::{BayesianConfig, BayesianOptimizer};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Strategy for proposing the next configuration to evaluate.
pub trait SearchStrategy: Send + Sync {
    /// Short strategy name.
    fn name(&self) -> &'static str;

    /// Next configuration, or `None` when the strategy has nothing left to try.
    fn propose(&mut self, space: &ParameterSpace, rng: &mut StdRng) -> Option<Configuration>;

    /// Feed back the score of the last proposal.
    fn observe(&mut self, config: &Configuration, score: f64);
}

/// Available search strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Kernel-regression Bayesian optimization
    #[default]
    Bayesian,
    /// Exhaustive grid
    Grid,
    /// Genetic algorithm
    Genetic,
    /// Simulated annealing
    Annealing,
    /// UCB1 multi-armed bandit over fixed arms
    Bandit,
}

impl StrategyKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Bayesian => "bayesian",
            StrategyKind::Grid => "grid",
            StrategyKind::Genetic => "genetic",
            StrategyKind::Annealing => "annealing",
            StrategyKind::Bandit => "bandit",
        }
    }

    /// Build the strategy from tuner settings.
    pub fn build(&self, config: &TunerConfig) -> Box<dyn SearchStrategy> {
        match self {
            StrategyKind::Bayesian => Box::new(BayesianSearch::new(BayesianConfig {
                seed: config.bayesian.seed.or(config.seed),
                ..config.bayesian.clone()
            })),
            StrategyKind::Grid => Box::new(GridSearch::new(config.grid_points)),
            StrategyKind::Genetic => Box::new(GeneticSearch::new(config.genetic.clone())),
            StrategyKind::Annealing => Box::new(AnnealingSearch::new(config.annealing.clone())),
            StrategyKind::Bandit => Box::new(BanditSearch::new(config.bandit.clone())),
        }
    }
}

/// Adapter running the [`BayesianOptimizer`] as a search strategy.
pub struct BayesianSearch {
    optimizer: BayesianOptimizer,
}

impl BayesianSearch {
    /// Create a new Bayesian search.
    pub fn new(config: BayesianConfig) -> Self {
        Self {
            optimizer: BayesianOptimizer::new(config),
        }
    }

    /// The underlying optimizer.
    pub fn optimizer(&self) -> &BayesianOptimizer {
        &self.optimizer
    }
}

impl SearchStrategy for BayesianSearch {
    fn name(&self) -> &'static str {
        StrategyKind::Bayesian.as_str()
    }

    fn propose(&mut self, space: &ParameterSpace, _rng: &mut StdRng) -> Option<Configuration> {
        Some(self.optimizer.suggest(space))
    }

    fn observe(&mut self, config: &Configuration, score: f64) {
        self.optimizer.observe(config.clone(), score);
    }
}

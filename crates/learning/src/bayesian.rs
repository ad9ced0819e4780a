//! Sequential model-based optimization over a parameter space.
//!
//! The surrogate is an RBF-kernel regression on unit-cube coordinates. Its
//! uncertainty shrinks with the kernel mass near a point, which is enough
//! to trade exploration against exploitation with an upper confidence
//! bound.

use agentune_core::{seeded_rng, Configuration, ParameterSpace};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Surrogate and acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Purely random suggestions before the surrogate is used
    pub initial_random: usize,
    /// Candidates scored per suggestion
    pub candidates: usize,
    /// Share of candidates drawn around the current best point
    pub local_fraction: f64,
    /// Max per-coordinate offset of local candidates
    pub perturbation: f64,
    /// RBF kernel length scale in unit-cube coordinates
    pub length_scale: f64,
    /// Exploration weight κ of the upper confidence bound
    pub exploration_weight: f64,
    /// Seed for candidate sampling
    pub seed: Option<u64>,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            initial_random: 5,
            candidates: 100,
            local_fraction: 0.3,
            perturbation: 0.1,
            length_scale: 0.25,
            exploration_weight: 2.0,
            seed: None,
        }
    }
}

/// An evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Evaluated parameters
    pub params: Configuration,
    /// Objective value (higher is better)
    pub score: f64,
}

/// Bayesian-style optimizer with a kernel-regression surrogate.
pub struct BayesianOptimizer {
    config: BayesianConfig,
    observations: Vec<Observation>,
    suggestions: usize,
    rng: StdRng,
}

impl BayesianOptimizer {
    /// Create an optimizer.
    pub fn new(config: BayesianConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            config,
            observations: Vec::new(),
            suggestions: 0,
        }
    }

    /// Next configuration to evaluate.
    pub fn suggest(&mut self, space: &ParameterSpace) -> Configuration {
        self.suggestions += 1;
        if self.observations.is_empty() || self.suggestions <= self.config.initial_random {
            return space.sample(&mut self.rng);
        }

        let points: Vec<(Vec<f64>, f64)> = self
            .observations
            .iter()
            .map(|o| (space.normalize(&o.params), o.score))
            .collect();
        let best = self
            .get_best()
            .map(|o| space.normalize(&o.params))
            .unwrap_or_else(|| vec![0.5; space.len()]);

        let total = self.config.candidates.max(1);
        let local = ((total as f64) * self.config.local_fraction.clamp(0.0, 1.0)).round() as usize;
        let step = self.config.perturbation.abs();

        let mut winner: Option<(Vec<f64>, f64)> = None;
        for i in 0..total {
            let x: Vec<f64> = if i < local {
                best.iter()
                    .map(|b| (b + self.rng.gen_range(-step..=step)).clamp(0.0, 1.0))
                    .collect()
            } else {
                (0..space.len()).map(|_| self.rng.gen::<f64>()).collect()
            };
            let (mean, uncertainty) = self.surrogate(&points, &x);
            let acquisition = mean + self.config.exploration_weight * uncertainty;
            if winner.as_ref().map_or(true, |(_, a)| acquisition > *a) {
                winner = Some((x, acquisition));
            }
        }

        let x = winner.map(|(x, _)| x).unwrap_or(best);
        debug!("Surrogate suggestion after {} observations", self.observations.len());
        space.denormalize(&x)
    }

    fn surrogate(&self, points: &[(Vec<f64>, f64)], x: &[f64]) -> (f64, f64) {
        let ls = self.config.length_scale.max(1e-6);
        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for (p, y) in points {
            let d2: f64 = p.iter().zip(x).map(|(a, b)| (a - b).powi(2)).sum();
            let w = (-d2 / (2.0 * ls * ls)).exp();
            weight_sum += w;
            weighted += w * y;
        }

        let mean = if weight_sum > 1e-12 {
            weighted / weight_sum
        } else {
            points.iter().map(|(_, y)| y).sum::<f64>() / points.len().max(1) as f64
        };
        (mean, 1.0 / (1.0 + weight_sum).sqrt())
    }

    /// Record an evaluation. Non-finite scores are ignored.
    pub fn observe(&mut self, params: Configuration, score: f64) {
        if !score.is_finite() {
            debug!("Ignoring non-finite score for {}", params);
            return;
        }
        self.observations.push(Observation { params, score });
    }

    /// Highest-scoring observation; the earliest wins ties.
    pub fn get_best(&self) -> Option<&Observation> {
        self.observations.iter().fold(None, |best, o| match best {
            Some(b) if o.score <= b.score => Some(b),
            _ => Some(o),
        })
    }

    /// All observations, in order.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentune_core::ParameterSpec;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::continuous("lr", 0.0001, 0.1),
            ParameterSpec::integer("bs", 8, 128),
        ])
        .unwrap()
    }

    #[test]
    fn test_best_of_two_observations() {
        let mut opt = BayesianOptimizer::new(BayesianConfig::default());
        opt.observe(Configuration::new().with("lr", 0.01).with("bs", 32), 0.85);
        opt.observe(Configuration::new().with("lr", 0.001).with("bs", 64), 0.92);

        let best = opt.get_best().unwrap();
        assert_eq!(best.score, 0.92);
        assert_eq!(best.params.get_i64("bs"), Some(64));
        assert_eq!(opt.get_best(), Some(best));
    }

    #[test]
    fn test_ties_keep_first() {
        let mut opt = BayesianOptimizer::new(BayesianConfig::default());
        opt.observe(Configuration::new().with("bs", 1), 0.5);
        opt.observe(Configuration::new().with("bs", 2), 0.5);
        opt.observe(Configuration::new().with("bs", 3), f64::NAN);
        assert_eq!(opt.get_best().unwrap().params.get_i64("bs"), Some(1));
        assert_eq!(opt.observations().len(), 2);
    }

    #[test]
    fn test_suggestions_stay_in_space() {
        let space = space();
        let mut opt = BayesianOptimizer::new(BayesianConfig {
            initial_random: 2,
            seed: Some(9),
            ..Default::default()
        });
        for i in 0..12 {
            let config = opt.suggest(&space);
            space.validate(&config).unwrap();
            opt.observe(config, i as f64 * 0.1);
        }
    }

    #[test]
    fn test_surrogate_converges_toward_optimum() {
        let space = ParameterSpace::new(vec![ParameterSpec::continuous("x", 0.0, 1.0)]).unwrap();
        let mut opt = BayesianOptimizer::new(BayesianConfig {
            initial_random: 5,
            exploration_weight: 0.5,
            seed: Some(21),
            ..Default::default()
        });
        let objective = |c: &Configuration| {
            let x = c.get_f64("x").unwrap_or(0.0);
            1.0 - (x - 0.7).powi(2)
        };
        for _ in 0..40 {
            let config = opt.suggest(&space);
            let score = objective(&config);
            opt.observe(config, score);
        }
        let best = opt.get_best().unwrap();
        assert!((best.params.get_f64("x").unwrap() - 0.7).abs() < 0.1);
    }
}

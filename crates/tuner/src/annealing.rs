//! Simulated annealing over the unit cube.

use crate::{SearchStrategy, StrategyKind};
use agentune_core::{interpolate_configs, Configuration, ParameterSpace};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Annealing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    /// Starting temperature
    pub initial_temperature: f64,
    /// Geometric cooling factor applied after every evaluation
    pub cooling_rate: f64,
    /// Temperature floor
    pub min_temperature: f64,
    /// Neighbor step toward a random point, as a fraction of the way
    pub step_size: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 1.0,
            cooling_rate: 0.95,
            min_temperature: 1e-3,
            step_size: 0.2,
        }
    }
}

/// Simulated annealing search.
pub struct AnnealingSearch {
    config: AnnealingConfig,
    temperature: f64,
    current: Option<(Configuration, f64)>,
    accepted: usize,
    rejected: usize,
    rng_draw: Option<f64>,
}

impl AnnealingSearch {
    /// Create a search at the initial temperature.
    pub fn new(config: AnnealingConfig) -> Self {
        let temperature = config.initial_temperature.max(config.min_temperature);
        Self {
            config,
            temperature,
            current: None,
            accepted: 0,
            rejected: 0,
            rng_draw: None,
        }
    }

    /// Current temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Current configuration and its score.
    pub fn current(&self) -> Option<(&Configuration, f64)> {
        self.current.as_ref().map(|(c, s)| (c, *s))
    }

    /// Accepted and rejected move counts.
    pub fn moves(&self) -> (usize, usize) {
        (self.accepted, self.rejected)
    }

    /// A random neighbor: `current` moved `step_size` of the way toward a
    /// uniformly sampled point.
    pub fn generate_neighbor(&self, current: &Configuration, space: &ParameterSpace, rng: &mut StdRng) -> Configuration {
        let target = space.sample(rng);
        interpolate_configs(current, &target, self.config.step_size, space)
    }

    /// Metropolis criterion for a maximization problem.
    ///
    /// Improvements are always accepted; a worse candidate is accepted with
    /// probability `exp((candidate - current) / temperature)`.
    pub fn accept_candidate(current: f64, candidate: f64, temperature: f64, rng: &mut impl Rng) -> bool {
        metropolis(current, candidate, temperature, rng.gen())
    }

    fn cool(&mut self) {
        self.temperature = (self.temperature * self.config.cooling_rate).max(self.config.min_temperature);
    }
}

fn metropolis(current: f64, candidate: f64, temperature: f64, draw: f64) -> bool {
    if candidate >= current {
        return true;
    }
    if !candidate.is_finite() || temperature <= 0.0 {
        return false;
    }
    draw < ((candidate - current) / temperature).exp()
}

impl SearchStrategy for AnnealingSearch {
    fn name(&self) -> &'static str {
        StrategyKind::Annealing.as_str()
    }

    fn propose(&mut self, space: &ParameterSpace, rng: &mut StdRng) -> Option<Configuration> {
        // observe() has no generator; draw its acceptance sample here.
        self.rng_draw = Some(rng.gen::<f64>());
        match &self.current {
            None => Some(space.center()),
            Some((current, _)) => Some(self.generate_neighbor(current, space, rng)),
        }
    }

    fn observe(&mut self, config: &Configuration, score: f64) {
        let draw = self.rng_draw.take().unwrap_or(1.0);
        let accept = match &self.current {
            None => true,
            Some((_, current)) => metropolis(*current, score, self.temperature, draw),
        };

        if accept {
            self.accepted += 1;
            self.current = Some((config.clone(), score));
        } else {
            self.rejected += 1;
        }
        self.cool();
        debug!("Annealing step: accept={} temperature={:.4}", accept, self.temperature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentune_core::ParameterSpec;
    use rand::SeedableRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::continuous("memory_threshold", 0.6, 0.9),
            ParameterSpec::integer("batch_size", 8, 256),
        ])
        .unwrap()
    }

    #[test]
    fn test_accept_candidate() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(AnnealingSearch::accept_candidate(0.5, 0.6, 1.0, &mut rng));
        assert!(AnnealingSearch::accept_candidate(0.5, 0.5, 0.0, &mut rng));
        assert!(!AnnealingSearch::accept_candidate(0.5, 0.4, 0.0, &mut rng));

        // Near-zero temperature almost never takes a big step down.
        let taken = (0..1000)
            .filter(|_| AnnealingSearch::accept_candidate(1.0, 0.0, 1e-3, &mut rng))
            .count();
        assert_eq!(taken, 0);

        // High temperature takes most small steps down.
        let taken = (0..1000)
            .filter(|_| AnnealingSearch::accept_candidate(1.0, 0.99, 10.0, &mut rng))
            .count();
        assert!(taken > 900);
    }

    #[test]
    fn test_neighbor_stays_in_bounds() {
        let space = space();
        let search = AnnealingSearch::new(AnnealingConfig::default());
        let mut rng = StdRng::seed_from_u64(4);
        let mut current = space.center();
        for _ in 0..100 {
            current = search.generate_neighbor(&current, &space, &mut rng);
            space.validate(&current).unwrap();
        }
    }

    #[test]
    fn test_cooling_floors_at_min_temperature() {
        let space = space();
        let mut search = AnnealingSearch::new(AnnealingConfig {
            cooling_rate: 0.5,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..40 {
            let config = search.propose(&space, &mut rng).unwrap();
            search.observe(&config, i as f64);
        }
        assert_eq!(search.temperature(), 1e-3);
        let (accepted, rejected) = search.moves();
        assert_eq!(accepted, 40);
        assert_eq!(rejected, 0);
        assert_eq!(search.current().map(|(_, s)| s), Some(39.0));
    }
}

//! Genetic search: elitism, tournament selection, crossover and mutation.

use crate::{SearchStrategy, StrategyKind};
use agentune_core::{interpolate_configs, Configuration, IndividualId, ParameterKind, ParameterSpace};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Genetic algorithm settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    /// Individuals per generation
    pub population_size: usize,
    /// Best individuals copied unchanged into the next generation
    pub elite_count: usize,
    /// Contestants per tournament
    pub tournament_size: usize,
    /// Probability that a child is bred by crossover instead of cloned
    pub crossover_rate: f64,
    /// Per-parameter mutation probability
    pub mutation_rate: f64,
    /// Max unit-cube offset of a numeric mutation
    pub mutation_strength: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            elite_count: 2,
            tournament_size: 3,
            crossover_rate: 0.8,
            mutation_rate: 0.2,
            mutation_strength: 0.2,
        }
    }
}

/// A candidate configuration in the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Unique id
    pub id: IndividualId,
    /// Genome
    pub config: Configuration,
    /// Score, once evaluated
    pub fitness: Option<f64>,
}

impl Individual {
    /// A fresh, unevaluated individual.
    pub fn new(config: Configuration) -> Self {
        Self {
            id: IndividualId::new(),
            config,
            fitness: None,
        }
    }
}

/// Generational genetic search.
pub struct GeneticSearch {
    config: GeneticConfig,
    population: Vec<Individual>,
    pending: Option<usize>,
    generation: usize,
}

impl GeneticSearch {
    /// Create a search with an empty population.
    pub fn new(config: GeneticConfig) -> Self {
        Self {
            config,
            population: Vec::new(),
            pending: None,
            generation: 0,
        }
    }

    /// Current population.
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Generations evolved so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Replace the population with `size` random individuals.
    pub fn initialize_population(&mut self, space: &ParameterSpace, size: usize, rng: &mut StdRng) -> &[Individual] {
        self.population = (0..size).map(|_| Individual::new(space.sample(rng))).collect();
        self.pending = None;
        &self.population
    }

    /// Breed a child: each parameter comes from `a`, from `b`, or from
    /// their midpoint.
    pub fn crossover(&self, a: &Individual, b: &Individual, space: &ParameterSpace, rng: &mut StdRng) -> Individual {
        let midpoint = interpolate_configs(&a.config, &b.config, 0.5, space);
        let mut child = Configuration::new();
        for spec in space.params() {
            let source = match rng.gen_range(0..3) {
                0 => &a.config,
                1 => &b.config,
                _ => &midpoint,
            };
            if let Some(value) = source.get(&spec.name) {
                child.set(spec.name.clone(), value.clone());
            }
        }
        Individual::new(space.clamp(&child))
    }

    /// Copy of `individual` with randomly perturbed parameters and a fresh id.
    pub fn mutate(&self, individual: &Individual, space: &ParameterSpace, rng: &mut StdRng) -> Individual {
        let strength = self.config.mutation_strength.abs();
        let mut genome = space.clamp(&individual.config);
        for spec in space.params() {
            if rng.gen::<f64>() >= self.config.mutation_rate {
                continue;
            }
            let value = match spec.kind {
                ParameterKind::Categorical { .. } => spec.sample(rng),
                _ => {
                    let x = genome.get(&spec.name).map(|v| spec.normalize(v)).unwrap_or(0.5);
                    let offset = if strength > 0.0 {
                        rng.gen_range(-strength..=strength)
                    } else {
                        0.0
                    };
                    spec.denormalize(x + offset)
                }
            };
            genome.set(spec.name.clone(), value);
        }
        Individual::new(genome)
    }

    fn tournament<'a>(&'a self, rng: &mut StdRng) -> &'a Individual {
        let rounds = self.config.tournament_size.max(1);
        let mut best = &self.population[rng.gen_range(0..self.population.len())];
        for _ in 1..rounds {
            let contender = &self.population[rng.gen_range(0..self.population.len())];
            if contender.fitness.unwrap_or(f64::NEG_INFINITY) > best.fitness.unwrap_or(f64::NEG_INFINITY) {
                best = contender;
            }
        }
        best
    }

    /// Replace the population with the next generation.
    pub fn evolve(&mut self, space: &ParameterSpace, rng: &mut StdRng) {
        let size = self.config.population_size.max(2);
        if self.population.is_empty() {
            self.initialize_population(space, size, rng);
            return;
        }

        let mut ranked = self.population.clone();
        ranked.sort_by(|a, b| {
            b.fitness
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.fitness.unwrap_or(f64::NEG_INFINITY))
        });
        let elites = self.config.elite_count.min(size - 1);
        let mut next: Vec<Individual> = ranked.into_iter().take(elites).collect();

        while next.len() < size {
            let parent = self.tournament(rng);
            let child = if rng.gen::<f64>() < self.config.crossover_rate {
                let other = self.tournament(rng);
                self.crossover(parent, other, space, rng)
            } else {
                Individual::new(parent.config.clone())
            };
            next.push(self.mutate(&child, space, rng));
        }

        self.population = next;
        self.pending = None;
        self.generation += 1;
        debug!("Evolved generation {}", self.generation);
    }

    /// Best evaluated individual.
    pub fn best(&self) -> Option<&Individual> {
        self.population
            .iter()
            .filter(|i| i.fitness.is_some())
            .max_by(|a, b| a.fitness.unwrap_or(0.0).total_cmp(&b.fitness.unwrap_or(0.0)))
    }
}

impl SearchStrategy for GeneticSearch {
    fn name(&self) -> &'static str {
        StrategyKind::Genetic.as_str()
    }

    fn propose(&mut self, space: &ParameterSpace, rng: &mut StdRng) -> Option<Configuration> {
        if self.population.is_empty() {
            let size = self.config.population_size.max(2);
            self.initialize_population(space, size, rng);
        }
        let next = match self.population.iter().position(|i| i.fitness.is_none()) {
            Some(i) => i,
            None => {
                self.evolve(space, rng);
                self.population.iter().position(|i| i.fitness.is_none())?
            }
        };
        self.pending = Some(next);
        Some(self.population[next].config.clone())
    }

    fn observe(&mut self, config: &Configuration, score: f64) {
        if let Some(individual) = self.pending.take().and_then(|i| self.population.get_mut(i)) {
            if individual.config == *config {
                individual.fitness = Some(if score.is_finite() { score } else { f64::NEG_INFINITY });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentune_core::ParameterSpec;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::integer("worker_pool", 4, 32),
            ParameterSpec::continuous("memory_threshold", 0.6, 0.9),
            ParameterSpec::integer("batch_size", 8, 256),
            ParameterSpec::categorical("queue_strategy", ["fifo", "priority", "fair"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_initialize_population() {
        let space = space();
        let mut search = GeneticSearch::new(GeneticConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let population = search.initialize_population(&space, 20, &mut rng);

        assert_eq!(population.len(), 20);
        for individual in population {
            space.validate(&individual.config).unwrap();
            assert!(individual.fitness.is_none());
        }
    }

    #[test]
    fn test_mutate_gives_fresh_id() {
        let space = space();
        let search = GeneticSearch::new(GeneticConfig {
            mutation_rate: 1.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(2);
        let parent = Individual::new(space.center());
        let child = search.mutate(&parent, &space, &mut rng);
        assert_ne!(child.id, parent.id);
        assert!(child.fitness.is_none());
        space.validate(&child.config).unwrap();
    }

    #[test]
    fn test_evolution_keeps_elites_and_improves() {
        let space = space();
        let mut search = GeneticSearch::new(GeneticConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        let fitness = |c: &Configuration| -((c.get_i64("worker_pool").unwrap_or(0) - 16) as f64).abs();

        let mut first_best = None;
        for _ in 0..200 {
            let config = search.propose(&space, &mut rng).unwrap();
            search.observe(&config, fitness(&config));
            if search.generation() == 0 {
                first_best = search.best().and_then(|b| b.fitness);
            }
        }
        assert!(search.generation() > 0);
        let best = search.best().unwrap().fitness.unwrap();
        assert!(best >= first_best.unwrap());
        assert!(best >= -3.0);
    }

    proptest! {
        #[test]
        fn prop_offspring_stay_in_bounds(seed in any::<u64>()) {
            let space = space();
            let search = GeneticSearch::new(GeneticConfig {
                mutation_rate: 0.5,
                mutation_strength: 1.0,
                ..Default::default()
            });
            let mut rng = StdRng::seed_from_u64(seed);
            let a = Individual::new(space.sample(&mut rng));
            let b = Individual::new(space.sample(&mut rng));

            let child = search.crossover(&a, &b, &space, &mut rng);
            prop_assert!(space.validate(&child.config).is_ok());
            let mutant = search.mutate(&child, &space, &mut rng);
            prop_assert!(space.validate(&mutant.config).is_ok());
            prop_assert_ne!(mutant.id, child.id);
        }
    }
}

//! Exhaustive grid search.

use crate::{SearchStrategy, StrategyKind};
use agentune_core::{Configuration, ParameterKind, ParameterSpace, ParameterSpec};
use rand::rngs::StdRng;

/// Walks every point of a regular grid, one per proposal.
pub struct GridSearch {
    points_per_param: usize,
    counter: Option<Vec<usize>>,
    exhausted: bool,
}

impl GridSearch {
    /// Grid with `points_per_param` levels per numeric parameter.
    ///
    /// Integer parameters with fewer values and categorical parameters use
    /// one level per value.
    pub fn new(points_per_param: usize) -> Self {
        Self {
            points_per_param: points_per_param.max(1),
            counter: None,
            exhausted: false,
        }
    }

    fn levels(&self, spec: &ParameterSpec) -> usize {
        match &spec.kind {
            ParameterKind::Integer { min, max } => {
                let values = max.abs_diff(*min).saturating_add(1);
                usize::try_from(values)
                    .unwrap_or(usize::MAX)
                    .min(self.points_per_param)
            }
            ParameterKind::Continuous { min, max } => {
                if min == max {
                    1
                } else {
                    self.points_per_param
                }
            }
            ParameterKind::Categorical { choices } => choices.len(),
        }
    }

    /// Number of grid points in `space`.
    pub fn total_points(&self, space: &ParameterSpace) -> usize {
        space
            .params()
            .iter()
            .map(|p| self.levels(p))
            .fold(1usize, |acc, l| acc.saturating_mul(l))
    }

    /// Whether every grid point has been proposed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        StrategyKind::Grid.as_str()
    }

    fn propose(&mut self, space: &ParameterSpace, _rng: &mut StdRng) -> Option<Configuration> {
        if self.exhausted {
            return None;
        }
        let levels: Vec<usize> = space.params().iter().map(|p| self.levels(p)).collect();
        let counter = self.counter.get_or_insert_with(|| vec![0; levels.len()]);

        let coordinates: Vec<f64> = counter
            .iter()
            .zip(&levels)
            .map(|(i, l)| if *l > 1 { *i as f64 / (*l - 1) as f64 } else { 0.5 })
            .collect();

        // Advance the mixed-radix counter, last parameter fastest.
        let mut carry = true;
        for (digit, l) in counter.iter_mut().zip(&levels).rev() {
            if !carry {
                break;
            }
            *digit += 1;
            if *digit >= *l {
                *digit = 0;
            } else {
                carry = false;
            }
        }
        if carry {
            self.exhausted = true;
        }

        Some(space.denormalize(&coordinates))
    }

    fn observe(&mut self, _config: &Configuration, _score: f64) {}
}

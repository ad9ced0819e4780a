//! Shared-representation multi-task learner.
//!
//! One dense `tanh` layer is shared by every task; each task owns a
//! sigmoid output head on top of it.

use agentune_core::{seeded_rng, AgentuneError, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Fully connected layer, weights stored row-major as `[output][input]`.
#[derive(Debug, Clone, PartialEq)]
struct DenseLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl DenseLayer {
    /// Xavier-uniform initialization.
    fn xavier(input: usize, output: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        let weights = (0..output)
            .map(|_| (0..input).map(|_| rng.gen_range(-limit..=limit)).collect())
            .collect();
        Self {
            weights,
            bias: vec![0.0; output],
        }
    }

    fn input_size(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn output_size(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64], activation: fn(f64) -> f64) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| activation(row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b))
            .collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Output head of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskHead {
    /// Relative weight of this task's loss
    pub loss_weight: f64,
    layer: DenseLayer,
}

impl TaskHead {
    /// Number of outputs.
    pub fn output_size(&self) -> usize {
        self.layer.output_size()
    }
}

/// Multi-task network with a shared representation layer.
pub struct MultiTaskLearner {
    shared: Option<DenseLayer>,
    heads: BTreeMap<String, TaskHead>,
    rng: StdRng,
    steps: usize,
}

impl MultiTaskLearner {
    /// Create a learner with no layers yet.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            shared: None,
            heads: BTreeMap::new(),
            rng: seeded_rng(seed),
            steps: 0,
        }
    }

    /// Create the shared layer. May only be called once.
    pub fn initialize_shared_layers(&mut self, input_size: usize, output_size: usize) -> Result<()> {
        if self.shared.is_some() {
            return Err(AgentuneError::InvalidState(
                "shared layers already initialized".to_string(),
            ));
        }
        if input_size == 0 || output_size == 0 {
            return Err(AgentuneError::InvalidInput(
                "layer sizes must be positive".to_string(),
            ));
        }

        self.shared = Some(DenseLayer::xavier(input_size, output_size, &mut self.rng));
        debug!("Initialized shared layer {}x{}", input_size, output_size);
        Ok(())
    }

    /// Whether the shared layer exists.
    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    /// Expected input width, once initialized.
    pub fn input_size(&self) -> Option<usize> {
        self.shared.as_ref().map(DenseLayer::input_size)
    }

    /// Add an output head for `task_id`.
    pub fn add_task_head(&mut self, task_id: impl Into<String>, output_size: usize, loss_weight: f64) -> Result<()> {
        let task_id = task_id.into();
        let shared = self
            .shared
            .as_ref()
            .ok_or(AgentuneError::NotInitialized("shared representation"))?;

        if self.heads.contains_key(&task_id) {
            return Err(AgentuneError::DuplicateTaskHead(task_id));
        }
        if output_size == 0 {
            return Err(AgentuneError::InvalidInput(format!(
                "task head {} needs at least one output",
                task_id
            )));
        }

        let layer = DenseLayer::xavier(shared.output_size(), output_size, &mut self.rng);
        self.heads.insert(task_id, TaskHead { loss_weight, layer });
        Ok(())
    }

    /// Whether `task_id` has a head.
    pub fn has_task(&self, task_id: &str) -> bool {
        self.heads.contains_key(task_id)
    }

    /// Training steps applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Registered task ids, sorted.
    pub fn task_ids(&self) -> Vec<String> {
        self.heads.keys().cloned().collect()
    }

    fn representation(&self, input: &[f64]) -> Result<Vec<f64>> {
        let shared = self
            .shared
            .as_ref()
            .ok_or(AgentuneError::NotInitialized("shared representation"))?;
        if input.len() != shared.input_size() {
            return Err(AgentuneError::InvalidInput(format!(
                "expected {} inputs, got {}",
                shared.input_size(),
                input.len()
            )));
        }
        Ok(shared.forward(input, f64::tanh))
    }

    fn head(&self, task_id: &str) -> Result<&TaskHead> {
        self.heads
            .get(task_id)
            .ok_or_else(|| AgentuneError::UnknownTask(task_id.to_string()))
    }

    /// Run the shared layer once, then every requested head.
    pub fn predict(&self, input: &[f64], task_ids: &[&str]) -> Result<HashMap<String, Vec<f64>>> {
        let hidden = self.representation(input)?;
        task_ids
            .iter()
            .map(|id| {
                let head = self.head(id)?;
                Ok((id.to_string(), head.layer.forward(&hidden, sigmoid)))
            })
            .collect()
    }

    /// One gradient step on the heads named in `targets`.
    ///
    /// The shared layer is left untouched. Returns the loss-weighted mean
    /// squared error measured before the step.
    pub fn train_step(&mut self, input: &[f64], targets: &BTreeMap<String, Vec<f64>>, learning_rate: f64) -> Result<f64> {
        let hidden = self.representation(input)?;
        for (task_id, target) in targets {
            let head = self.head(task_id)?;
            if target.len() != head.output_size() {
                return Err(AgentuneError::InvalidInput(format!(
                    "task {} expects {} targets, got {}",
                    task_id,
                    head.output_size(),
                    target.len()
                )));
            }
        }

        let mut loss = 0.0;
        for (task_id, target) in targets {
            let Some(head) = self.heads.get_mut(task_id) else {
                continue;
            };
            let outputs = head.layer.forward(&hidden, sigmoid);
            let k = outputs.len() as f64;

            let mse = outputs
                .iter()
                .zip(target)
                .map(|(y, t)| (y - t).powi(2))
                .sum::<f64>()
                / k;
            loss += head.loss_weight * mse;

            for (o, (y, t)) in outputs.iter().zip(target).enumerate() {
                let grad = head.loss_weight * 2.0 / k * (y - t) * y * (1.0 - y);
                for (w, h) in head.layer.weights[o].iter_mut().zip(&hidden) {
                    *w -= learning_rate * grad * h;
                }
                head.layer.bias[o] -= learning_rate * grad;
            }
        }
        self.steps += 1;
        Ok(loss)
    }
}

//! Anomaly scoring against a learned baseline.
//!
//! Two signals are blended: an isolation forest (how easily a point is
//! separated from the baseline by random axis-aligned splits) and the
//! largest per-feature z-score.

use agentune_core::{seeded_rng, AgentuneError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Anomaly detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Baseline samples required by `initialize`
    pub min_samples: usize,
    /// Score above which a sample is anomalous
    pub threshold: f64,
    /// Trees in the isolation forest
    pub trees: usize,
    /// Max samples per tree
    pub subsample: usize,
    /// Seed for tree construction
    pub seed: Option<u64>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            threshold: 0.6,
            trees: 100,
            subsample: 256,
            seed: None,
        }
    }
}

/// Score of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    /// Combined score (0-1)
    pub score: f64,
    /// `score > threshold`
    pub is_anomaly: bool,
    /// Isolation forest component (0-1)
    pub isolation: f64,
    /// z-score component (0-1)
    pub z_component: f64,
    /// Largest absolute z-score over the features
    pub max_z: f64,
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(points: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || points.len() <= 1 {
            return Node::Leaf { size: points.len() };
        }

        let dims = points[0].len();
        let feature = rng.gen_range(0..dims);
        let (min, max) = points
            .iter()
            .map(|p| p[feature])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if !(max > min) {
            return Node::Leaf { size: points.len() };
        }

        let value = rng.gen_range(min..max);
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) = points.iter().partition(|p| p[feature] < value);
        Node::Split {
            feature,
            value,
            left: Box::new(Node::build(&left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path(*size),
            Node::Split {
                feature,
                value,
                left,
                right,
            } => {
                if x[*feature] < *value {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful search in a binary tree of `n` nodes.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

struct Baseline {
    means: Vec<f64>,
    stds: Vec<f64>,
    forest: Vec<Node>,
    subsample: usize,
}

/// Isolation-forest plus z-score anomaly detector.
pub struct AnomalyDetector {
    config: AnomalyConfig,
    baseline: Option<Baseline>,
    rng: StdRng,
}

impl AnomalyDetector {
    /// Create an uninitialized detector.
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            config,
            baseline: None,
        }
    }

    /// Whether a baseline has been learned.
    pub fn is_initialized(&self) -> bool {
        self.baseline.is_some()
    }

    /// Learn the baseline from normal samples.
    pub fn initialize(&mut self, samples: &[Vec<f64>]) -> Result<()> {
        if samples.len() < self.config.min_samples.max(2) {
            return Err(AgentuneError::InsufficientSamples {
                needed: self.config.min_samples.max(2),
                got: samples.len(),
            });
        }
        let dims = samples[0].len();
        if dims == 0 {
            return Err(AgentuneError::InvalidInput("samples have no features".to_string()));
        }
        if samples.iter().any(|s| s.len() != dims) {
            return Err(AgentuneError::InvalidInput(
                "samples have inconsistent dimensions".to_string(),
            ));
        }
        if samples.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AgentuneError::InvalidInput("samples contain non-finite values".to_string()));
        }

        let n = samples.len() as f64;
        let means: Vec<f64> = (0..dims)
            .map(|d| samples.iter().map(|s| s[d]).sum::<f64>() / n)
            .collect();
        let stds: Vec<f64> = (0..dims)
            .map(|d| (samples.iter().map(|s| (s[d] - means[d]).powi(2)).sum::<f64>() / n).sqrt())
            .collect();

        let subsample = self.config.subsample.clamp(2, samples.len());
        let max_depth = (subsample as f64).log2().ceil() as usize;
        let forest = (0..self.config.trees.max(1))
            .map(|_| {
                let picked: Vec<&[f64]> = sample(&mut self.rng, samples.len(), subsample)
                    .into_iter()
                    .map(|i| samples[i].as_slice())
                    .collect();
                Node::build(&picked, 0, max_depth, &mut self.rng)
            })
            .collect();

        self.baseline = Some(Baseline {
            means,
            stds,
            forest,
            subsample,
        });
        Ok(())
    }

    /// Score a sample against the baseline.
    pub fn detect_anomalies(&self, sample: &[f64]) -> Result<AnomalyScore> {
        let baseline = self
            .baseline
            .as_ref()
            .ok_or(AgentuneError::NotInitialized("AnomalyDetector"))?;
        if sample.len() != baseline.means.len() {
            return Err(AgentuneError::InvalidInput(format!(
                "expected {} features, got {}",
                baseline.means.len(),
                sample.len()
            )));
        }

        let mean_path = baseline
            .forest
            .iter()
            .map(|tree| tree.path_length(sample, 0))
            .sum::<f64>()
            / baseline.forest.len() as f64;
        let isolation = 2f64.powf(-mean_path / average_path(baseline.subsample).max(1e-9));

        let max_z = sample
            .iter()
            .zip(baseline.means.iter().zip(&baseline.stds))
            .map(|(x, (m, s))| {
                if !x.is_finite() {
                    f64::INFINITY
                } else if *s > 0.0 {
                    (x - m).abs() / s
                } else if (x - m).abs() > f64::EPSILON {
                    f64::INFINITY
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        let z_component = 1.0 - (-(max_z / 3.0).powi(2)).exp();

        let score = (0.5 * isolation + 0.5 * z_component).clamp(0.0, 1.0);
        Ok(AnomalyScore {
            score,
            is_anomaly: score > self.config.threshold,
            isolation,
            z_component,
            max_z,
        })
    }
}

//! Approximate Shapley-value attribution.
//!
//! Attributions are estimated by sampling feature permutations and
//! averaging each feature's marginal contribution when it is switched from
//! the baseline to the input value. Every sampled permutation telescopes,
//! so the attributions always sum to `prediction - base_value`.

use agentune_core::{seeded_rng, AgentuneError, Result, FEATURE_NAMES};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Attribution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Permutations sampled per explanation
    pub permutations: usize,
    /// Factors reported in an explanation
    pub top_k: usize,
    /// Seed for permutation sampling
    pub seed: Option<u64>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            permutations: 64,
            top_k: 3,
            seed: None,
        }
    }
}

/// Raw attribution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapValues {
    /// Contribution of each input feature
    pub attribution: Vec<f64>,
    /// Feature indices by decreasing |attribution|
    pub ranking: Vec<usize>,
    /// Prediction at the baseline
    pub base_value: f64,
    /// Prediction at the input
    pub prediction: f64,
}

/// Effect of a factor on the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Pushes the prediction up
    Increases,
    /// Pushes the prediction down
    Decreases,
}

/// One of the most influential features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    /// Feature name
    pub feature: String,
    /// Feature index
    pub index: usize,
    /// Attribution
    pub contribution: f64,
    /// Input value of the feature
    pub value: f64,
    /// Sign of the contribution
    pub direction: Direction,
}

/// Human-oriented explanation of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Full attribution vector
    pub attribution_vector: Vec<f64>,
    /// Most influential features
    pub top_factors: Vec<Factor>,
    /// Confidence in the explanation (0-1)
    pub confidence: f64,
}

/// Permutation-sampling feature attribution.
pub struct ExplainableAI {
    config: ExplainConfig,
    baseline: Option<Vec<f64>>,
    feature_names: Vec<String>,
    rng: StdRng,
}

impl ExplainableAI {
    /// Create an explainer with a zero baseline and workflow feature names.
    pub fn new(config: ExplainConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            config,
            baseline: None,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Use a fixed reference input instead of zeros.
    pub fn with_baseline(mut self, baseline: Vec<f64>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Estimate per-feature contributions of `predict_fn(model, input)`.
    pub fn compute_shap<M, F>(&mut self, model: &M, input: &[f64], predict_fn: F) -> Result<ShapValues>
    where
        M: ?Sized,
        F: Fn(&M, &[f64]) -> f64,
    {
        if input.is_empty() {
            return Err(AgentuneError::InvalidInput("cannot explain an empty input".to_string()));
        }
        let baseline = match &self.baseline {
            Some(b) if b.len() != input.len() => {
                return Err(AgentuneError::InvalidInput(format!(
                    "baseline has {} features, input has {}",
                    b.len(),
                    input.len()
                )))
            }
            Some(b) => b.clone(),
            None => vec![0.0; input.len()],
        };

        let base_value = predict_fn(model, &baseline);
        let prediction = predict_fn(model, input);
        let permutations = self.config.permutations.max(1);

        let mut attribution = vec![0.0; input.len()];
        let mut order: Vec<usize> = (0..input.len()).collect();
        for _ in 0..permutations {
            order.shuffle(&mut self.rng);
            let mut x = baseline.clone();
            let mut previous = base_value;
            for &i in &order {
                x[i] = input[i];
                let current = predict_fn(model, &x);
                attribution[i] += current - previous;
                previous = current;
            }
        }
        for a in &mut attribution {
            *a /= permutations as f64;
        }

        Ok(ShapValues {
            ranking: rank(&attribution),
            attribution,
            base_value,
            prediction,
        })
    }

    /// Summarize an attribution vector.
    ///
    /// Confidence grows with how concentrated the attribution is in the
    /// reported factors and with its overall magnitude.
    pub fn generate_explanation(&self, attribution: &[f64], input: &[f64]) -> Explanation {
        let top_factors: Vec<Factor> = rank(attribution)
            .into_iter()
            .filter(|&i| attribution[i] != 0.0)
            .take(self.config.top_k)
            .map(|i| Factor {
                feature: self
                    .feature_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("feature_{}", i)),
                index: i,
                contribution: attribution[i],
                value: input.get(i).copied().unwrap_or(0.0),
                direction: if attribution[i] > 0.0 {
                    Direction::Increases
                } else {
                    Direction::Decreases
                },
            })
            .collect();

        let total: f64 = attribution.iter().map(|a| a.abs()).sum();
        let confidence = if total > 0.0 && total.is_finite() {
            let covered: f64 = top_factors.iter().map(|f| f.contribution.abs()).sum();
            let concentration = covered / total;
            let magnitude = total / (total + 0.1);
            (concentration * magnitude).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Explanation {
            attribution_vector: attribution.to_vec(),
            top_factors,
            confidence,
        }
    }
}

fn rank(attribution: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..attribution.len()).collect();
    idx.sort_by(|&a, &b| {
        attribution[b]
            .abs()
            .partial_cmp(&attribution[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}

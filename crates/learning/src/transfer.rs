//! Transfer of learned weights between related domains.

use agentune_core::{seeded_rng, AgentuneError, Result};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Weight of feature cosine similarity in the domain similarity.
const FEATURE_WEIGHT: f64 = 0.6;

/// Weight of tag overlap in the domain similarity.
const TAG_WEIGHT: f64 = 0.4;

/// Describes a domain for similarity matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainMetadata {
    /// Numeric domain characteristics (e.g. "avg_complexity")
    pub features: BTreeMap<String, f64>,
    /// Free-form labels
    pub tags: BTreeSet<String>,
}

impl DomainMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numeric feature.
    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// A trained model registered for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    /// Flattened weights
    pub weights: Vec<f64>,
    /// Layer sizes
    pub architecture: Vec<usize>,
    /// Domain description
    pub domain_metadata: DomainMetadata,
    /// Quality of the model in its own domain (0-1)
    pub performance_score: f64,
}

impl SourceModel {
    /// Create a model.
    pub fn new(weights: Vec<f64>, architecture: Vec<usize>, performance_score: f64) -> Self {
        Self {
            weights,
            architecture,
            domain_metadata: DomainMetadata::default(),
            performance_score,
        }
    }

    /// Attach domain metadata.
    pub fn with_metadata(mut self, metadata: DomainMetadata) -> Self {
        self.domain_metadata = metadata;
        self
    }
}

/// Result of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferredModel {
    /// The adapted model
    pub model: SourceModel,
    /// Source domain id
    pub transferred_from: String,
    /// Target domain id
    pub target: String,
    /// Domain similarity used (0-1)
    pub similarity: f64,
    /// Number of weights kept from the source
    pub retained: usize,
}

/// Transfer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Similarity assumed when the target domain is unknown
    pub unknown_similarity: f64,
    /// Half-width of the uniform range for re-initialized weights
    pub reinit_scale: f64,
    /// Seed for re-initialization
    pub seed: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            unknown_similarity: 0.5,
            reinit_scale: 0.1,
            seed: None,
        }
    }
}

/// Registry of source models and transferred results.
pub struct TransferLearningEngine {
    config: TransferConfig,
    sources: HashMap<String, SourceModel>,
    domains: HashMap<String, DomainMetadata>,
    transferred: HashMap<String, TransferredModel>,
    rng: StdRng,
}

impl TransferLearningEngine {
    /// Create an empty engine.
    pub fn new(config: TransferConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            config,
            sources: HashMap::new(),
            domains: HashMap::new(),
            transferred: HashMap::new(),
        }
    }

    /// Register (or replace) the model of a domain.
    pub fn register_source_model(&mut self, domain_id: impl Into<String>, model: SourceModel) {
        let domain_id = domain_id.into();
        debug!("Registering source model for domain {}", domain_id);
        self.domains
            .insert(domain_id.clone(), model.domain_metadata.clone());
        self.sources.insert(domain_id, model);
    }

    /// Describe a domain that has no model of its own.
    pub fn register_domain(&mut self, domain_id: impl Into<String>, metadata: DomainMetadata) {
        self.domains.insert(domain_id.into(), metadata);
    }

    /// Similarity between two registered domains, in `[0, 1]`.
    pub fn domain_similarity(&self, source: &str, target: &str) -> f64 {
        match (self.domains.get(source), self.domains.get(target)) {
            (Some(a), Some(b)) => similarity(a, b),
            _ => self.config.unknown_similarity.clamp(0.0, 1.0),
        }
    }

    /// Adapt the model of `source` to `target`.
    ///
    /// The leading `round(similarity * n)` weights are kept; the remainder
    /// is re-initialized with small random values.
    pub fn transfer_knowledge(&mut self, source: &str, target: &str) -> Result<TransferredModel> {
        let model = self
            .sources
            .get(source)
            .ok_or_else(|| AgentuneError::UnknownModel(source.to_string()))?;

        let similarity = self.domain_similarity(source, target);
        let n = model.weights.len();
        let retained = ((similarity * n as f64).round() as usize).min(n);
        let scale = self.config.reinit_scale.abs();

        let mut weights = model.weights[..retained].to_vec();
        for _ in retained..n {
            let w = if scale > 0.0 {
                self.rng.gen_range(-scale..=scale)
            } else {
                0.0
            };
            weights.push(w);
        }

        let domain_metadata = self
            .domains
            .get(target)
            .cloned()
            .unwrap_or_else(|| model.domain_metadata.clone());

        let result = TransferredModel {
            model: SourceModel {
                weights,
                architecture: model.architecture.clone(),
                domain_metadata,
                performance_score: model.performance_score * similarity,
            },
            transferred_from: source.to_string(),
            target: target.to_string(),
            similarity,
            retained,
        };

        debug!(
            "Transferred {} -> {} (similarity {:.3}, kept {}/{})",
            source, target, similarity, retained, n
        );
        self.transferred.insert(target.to_string(), result.clone());
        Ok(result)
    }

    /// Model transferred into `target`, if any.
    pub fn get_model(&self, target: &str) -> Option<&TransferredModel> {
        self.transferred.get(target)
    }

    /// Registered source model of `domain_id`.
    pub fn source_model(&self, domain_id: &str) -> Option<&SourceModel> {
        self.sources.get(domain_id)
    }
}

fn similarity(a: &DomainMetadata, b: &DomainMetadata) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (name, x) in &a.features {
        if let Some(y) = b.features.get(name) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
    }
    let cosine = if na > 0.0 && nb > 0.0 {
        (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let union = a.tags.union(&b.tags).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        a.tags.intersection(&b.tags).count() as f64 / union as f64
    };

    FEATURE_WEIGHT * cosine + TAG_WEIGHT * jaccard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TransferLearningEngine {
        TransferLearningEngine::new(TransferConfig {
            seed: Some(11),
            ..Default::default()
        })
    }

    fn metadata(complexity: f64, tags: &[&str]) -> DomainMetadata {
        tags.iter().fold(
            DomainMetadata::new()
                .with_feature("avg_complexity", complexity)
                .with_feature("avg_duration", 10.0),
            |m, t| m.with_tag(*t),
        )
    }

    #[test]
    fn test_unknown_source_is_error() {
        let mut engine = engine();
        assert_eq!(
            engine.transfer_knowledge("missing", "x"),
            Err(AgentuneError::UnknownModel("missing".to_string()))
        );
    }

    #[test]
    fn test_identical_domains_keep_all_weights() {
        let mut engine = engine();
        let meta = metadata(5.0, &["code"]);
        engine.register_source_model(
            "analysis",
            SourceModel::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], 0.8).with_metadata(meta.clone()),
        );
        engine.register_domain("review", meta);

        let result = engine.transfer_knowledge("analysis", "review").unwrap();
        assert!((result.similarity - 1.0).abs() < 1e-12);
        assert_eq!(result.retained, 4);
        assert_eq!(result.model.weights, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(result.transferred_from, "analysis");
        assert_eq!(engine.get_model("review"), Some(&result));
    }

    #[test]
    fn test_unknown_target_uses_default_similarity() {
        let mut engine = engine();
        engine.register_source_model("analysis", SourceModel::new(vec![9.0; 10], vec![10], 1.0));

        let result = engine.transfer_knowledge("analysis", "new-domain").unwrap();
        assert_eq!(result.similarity, 0.5);
        assert_eq!(result.retained, 5);
        assert!(result.model.weights[..5].iter().all(|w| *w == 9.0));
        assert!(result.model.weights[5..].iter().all(|w| w.abs() <= 0.1));
        assert_eq!(result.model.performance_score, 0.5);
    }

    #[test]
    fn test_partial_similarity() {
        let mut engine = engine();
        engine.register_source_model(
            "a",
            SourceModel::new(vec![1.0; 10], vec![10], 1.0).with_metadata(metadata(5.0, &["x", "y"])),
        );
        engine.register_domain("b", metadata(5.0, &["y", "z"]));

        let sim = engine.domain_similarity("a", "b");
        // cosine 1.0, jaccard 1/3
        assert!((sim - (0.6 + 0.4 / 3.0)).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut engine = engine();
        engine.register_source_model("a", SourceModel::new(vec![1.0], vec![1], 0.1));
        engine.register_source_model("a", SourceModel::new(vec![2.0], vec![1], 0.9));
        assert_eq!(engine.source_model("a").unwrap().performance_score, 0.9);
    }
}

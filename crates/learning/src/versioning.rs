//! Model version registry with live A/B comparison.

use agentune_core::{seeded_rng, AgentuneError, Result, Time};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Weight of success rate in the A/B composite score.
const SUCCESS_WEIGHT: f64 = 0.7;

/// Weight of relative latency in the A/B composite score.
const LATENCY_WEIGHT: f64 = 0.3;

/// A registered model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version id (e.g. "v1.0")
    pub id: String,
    /// Opaque model artifact
    pub model: Value,
    /// Free-form metadata
    pub metadata: Value,
    /// Registration time
    pub created_at: Time,
}

/// Result of serving one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Observed latency in milliseconds
    pub latency_ms: f64,
    /// Whether the request succeeded
    pub success: bool,
}

/// Accumulated per-version statistics within a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionStats {
    /// Results recorded
    pub samples: u64,
    /// Successful results
    pub successes: u64,
    /// Sum of latencies
    pub total_latency_ms: f64,
}

impl VersionStats {
    /// Success fraction (0 with no samples).
    pub fn success_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.successes as f64 / self.samples as f64
        }
    }

    /// Mean latency (0 with no samples).
    pub fn mean_latency_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_latency_ms / self.samples as f64
        }
    }
}

/// A/B test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbTestStatus {
    /// Collecting results
    Running,
    /// Winner determined; results frozen
    Completed,
}

/// A live comparison between versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTest {
    /// Test id
    pub id: String,
    /// Participating versions, in declaration order
    pub versions: Vec<String>,
    /// Normalized traffic shares, aligned with `versions`
    pub traffic_split: Vec<f64>,
    /// Per-version results
    pub results: BTreeMap<String, VersionStats>,
    /// Current state
    pub status: AbTestStatus,
    /// Winning version once completed
    pub winner: Option<String>,
    /// Start time
    pub started_at: Time,
}

/// Per-version line of an A/B report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version id
    pub version: String,
    /// Accumulated statistics
    pub stats: VersionStats,
    /// Composite score, once every participant has enough samples
    pub score: Option<f64>,
}

/// Report returned by [`ModelVersionManager::get_ab_test_results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestResults {
    /// Test id
    pub test_id: String,
    /// Test state
    pub status: AbTestStatus,
    /// One summary per participant
    pub versions: Vec<VersionSummary>,
    /// Winner, if determined
    pub winner: Option<String>,
}

/// Versioning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Results needed per participant before a winner is picked
    pub min_samples: u64,
    /// Seed for request routing
    pub seed: Option<u64>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            seed: None,
        }
    }
}

/// Registry of model versions and their A/B tests.
pub struct ModelVersionManager {
    config: VersioningConfig,
    versions: BTreeMap<String, ModelVersion>,
    active: Option<String>,
    tests: BTreeMap<String, AbTest>,
    rng: StdRng,
}

impl ModelVersionManager {
    /// Create an empty registry.
    pub fn new(config: VersioningConfig) -> Self {
        Self {
            rng: seeded_rng(config.seed),
            config,
            versions: BTreeMap::new(),
            active: None,
            tests: BTreeMap::new(),
        }
    }

    /// Register a version. The first registered version becomes active.
    pub fn register_version(&mut self, id: impl Into<String>, model: Value, metadata: Value) -> Result<()> {
        let id = id.into();
        if self.versions.contains_key(&id) {
            return Err(AgentuneError::DuplicateVersion(id));
        }

        self.versions.insert(
            id.clone(),
            ModelVersion {
                id: id.clone(),
                model,
                metadata,
                created_at: chrono::Utc::now(),
            },
        );
        if self.active.is_none() {
            self.active = Some(id.clone());
        }
        info!("Registered model version {}", id);
        Ok(())
    }

    /// Make `id` the active version.
    pub fn activate(&mut self, id: &str) -> Result<()> {
        if !self.versions.contains_key(id) {
            return Err(AgentuneError::UnknownVersion(id.to_string()));
        }
        self.active = Some(id.to_string());
        Ok(())
    }

    /// The active version.
    pub fn active_version(&self) -> Option<&ModelVersion> {
        self.active.as_ref().and_then(|id| self.versions.get(id))
    }

    /// Start routing traffic between `versions` according to `split`.
    ///
    /// The split must have one non-negative entry per version and a
    /// positive sum; it is normalized to sum to 1.
    pub fn start_ab_test(&mut self, test_id: impl Into<String>, versions: Vec<String>, split: Vec<f64>) -> Result<()> {
        let test_id = test_id.into();
        if self.tests.contains_key(&test_id) {
            return Err(AgentuneError::DuplicateTest(test_id));
        }
        if versions.len() < 2 {
            return Err(AgentuneError::InvalidInput(
                "an A/B test needs at least two versions".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for v in &versions {
            if !self.versions.contains_key(v) {
                return Err(AgentuneError::UnknownVersion(v.clone()));
            }
            if !seen.insert(v) {
                return Err(AgentuneError::InvalidInput(format!("version {} listed twice", v)));
            }
        }
        if split.len() != versions.len() {
            return Err(AgentuneError::InvalidInput(format!(
                "{} versions but {} traffic shares",
                versions.len(),
                split.len()
            )));
        }
        if split.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(AgentuneError::InvalidInput(
                "traffic shares must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = split.iter().sum();
        if total <= 0.0 {
            return Err(AgentuneError::InvalidInput(
                "traffic shares must not all be zero".to_string(),
            ));
        }

        let results = versions
            .iter()
            .map(|v| (v.clone(), VersionStats::default()))
            .collect();
        info!("Starting A/B test {} over {:?}", test_id, versions);
        self.tests.insert(
            test_id.clone(),
            AbTest {
                id: test_id,
                traffic_split: split.iter().map(|s| s / total).collect(),
                versions,
                results,
                status: AbTestStatus::Running,
                winner: None,
                started_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    /// Pick the version that should serve the next request of a test.
    ///
    /// A completed test always routes to its winner.
    pub fn route_request(&mut self, test_id: &str) -> Result<String> {
        let test = self
            .tests
            .get(test_id)
            .ok_or_else(|| AgentuneError::UnknownTest(test_id.to_string()))?;

        if let Some(winner) = &test.winner {
            return Ok(winner.clone());
        }

        let mut draw = self.rng.gen::<f64>();
        for (version, share) in test.versions.iter().zip(&test.traffic_split) {
            if draw < *share {
                return Ok(version.clone());
            }
            draw -= share;
        }
        // Rounding can leave a sliver past the last share.
        test.versions
            .iter()
            .zip(&test.traffic_split)
            .rev()
            .find(|(_, s)| **s > 0.0)
            .map(|(v, _)| v.clone())
            .ok_or_else(|| AgentuneError::InvalidState(format!("test {} has no traffic", test_id)))
    }

    /// Record a served request for every running test containing `version`.
    pub fn record_result(&mut self, version: &str, outcome: Outcome) -> Result<()> {
        if !self.versions.contains_key(version) {
            return Err(AgentuneError::UnknownVersion(version.to_string()));
        }

        for test in self.tests.values_mut() {
            if test.status != AbTestStatus::Running {
                continue;
            }
            if let Some(stats) = test.results.get_mut(version) {
                stats.samples += 1;
                if outcome.success {
                    stats.successes += 1;
                }
                if outcome.latency_ms.is_finite() {
                    stats.total_latency_ms += outcome.latency_ms.max(0.0);
                }
            }
        }
        Ok(())
    }

    /// Current results of a test.
    ///
    /// Once every participant has at least `min_samples` results, the
    /// winner is picked by `0.7 * success_rate + 0.3 * (1 - latency / max_latency)`
    /// (earliest participant on ties) and the test is frozen.
    pub fn get_ab_test_results(&mut self, test_id: &str) -> Result<AbTestResults> {
        let min_samples = self.config.min_samples;
        let test = self
            .tests
            .get_mut(test_id)
            .ok_or_else(|| AgentuneError::UnknownTest(test_id.to_string()))?;

        let ready = test
            .versions
            .iter()
            .all(|v| test.results.get(v).map_or(0, |s| s.samples) >= min_samples);

        let scores: Option<Vec<f64>> = ready.then(|| {
            let max_latency = test
                .results
                .values()
                .map(VersionStats::mean_latency_ms)
                .fold(0.0, f64::max);
            test.versions
                .iter()
                .map(|v| {
                    let stats = test.results.get(v).cloned().unwrap_or_default();
                    let latency_term = if max_latency > 0.0 {
                        1.0 - stats.mean_latency_ms() / max_latency
                    } else {
                        1.0
                    };
                    SUCCESS_WEIGHT * stats.success_rate() + LATENCY_WEIGHT * latency_term
                })
                .collect()
        });

        if test.status == AbTestStatus::Running {
            if let Some(scores) = &scores {
                let mut best = 0;
                for (i, score) in scores.iter().enumerate() {
                    if *score > scores[best] {
                        best = i;
                    }
                }
                let winner = test.versions[best].clone();
                info!("A/B test {} completed, winner {}", test_id, winner);
                test.winner = Some(winner);
                test.status = AbTestStatus::Completed;
            }
        }

        Ok(AbTestResults {
            test_id: test.id.clone(),
            status: test.status,
            versions: test
                .versions
                .iter()
                .enumerate()
                .map(|(i, v)| VersionSummary {
                    version: v.clone(),
                    stats: test.results.get(v).cloned().unwrap_or_default(),
                    score: scores.as_ref().map(|s| s[i]),
                })
                .collect(),
            winner: test.winner.clone(),
        })
    }

    /// Look up a test.
    pub fn get_ab_test(&self, test_id: &str) -> Option<&AbTest> {
        self.tests.get(test_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> ModelVersionManager {
        let mut m = ModelVersionManager::new(VersioningConfig {
            seed: Some(4),
            ..Default::default()
        });
        m.register_version("v1.0", json!({"w": [1]}), json!({})).unwrap();
        m.register_version("v2.0", json!({"w": [2]}), json!({"note": "faster"})).unwrap();
        m
    }

    fn versions() -> Vec<String> {
        vec!["v1.0".to_string(), "v2.0".to_string()]
    }

    #[test]
    fn test_first_version_is_active() {
        let mut m = manager();
        assert_eq!(m.active_version().unwrap().id, "v1.0");
        m.activate("v2.0").unwrap();
        assert_eq!(m.active_version().unwrap().id, "v2.0");
        assert!(m.activate("v9").is_err());
        assert_eq!(
            m.register_version("v1.0", json!(null), json!(null)),
            Err(AgentuneError::DuplicateVersion("v1.0".to_string()))
        );
    }

    #[test]
    fn test_start_validates_input() {
        let mut m = manager();
        assert!(m.start_ab_test("t", versions(), vec![1.0]).is_err());
        assert!(m.start_ab_test("t", versions(), vec![-1.0, 2.0]).is_err());
        assert!(m.start_ab_test("t", versions(), vec![0.0, 0.0]).is_err());
        assert!(matches!(
            m.start_ab_test("t", vec!["v1.0".into(), "v3".into()], vec![1.0, 1.0]),
            Err(AgentuneError::UnknownVersion(_))
        ));

        m.start_ab_test("t", versions(), vec![3.0, 1.0]).unwrap();
        assert_eq!(m.get_ab_test("t").unwrap().traffic_split, vec![0.75, 0.25]);
        assert!(matches!(
            m.start_ab_test("t", versions(), vec![1.0, 1.0]),
            Err(AgentuneError::DuplicateTest(_))
        ));
    }

    #[test]
    fn test_routing_follows_split() {
        let mut m = manager();
        m.start_ab_test("t", versions(), vec![1.0, 0.0]).unwrap();
        for _ in 0..50 {
            assert_eq!(m.route_request("t").unwrap(), "v1.0");
        }
        assert!(matches!(m.route_request("nope"), Err(AgentuneError::UnknownTest(_))));
    }

    #[test]
    fn test_lower_latency_wins() {
        let mut m = manager();
        m.start_ab_test("latency", versions(), vec![0.5, 0.5]).unwrap();

        for i in 0..50 {
            let success = i % 10 != 0;
            m.record_result("v1.0", Outcome { latency_ms: 200.0, success }).unwrap();
            m.record_result("v2.0", Outcome { latency_ms: 100.0, success }).unwrap();
        }

        let results = m.get_ab_test_results("latency").unwrap();
        assert_eq!(results.status, AbTestStatus::Completed);
        assert_eq!(results.winner.as_deref(), Some("v2.0"));
        assert!(versions().contains(results.winner.as_ref().unwrap()));
        assert_eq!(m.route_request("latency").unwrap(), "v2.0");

        m.record_result("v1.0", Outcome { latency_ms: 1.0, success: true }).unwrap();
        let frozen = m.get_ab_test_results("latency").unwrap();
        assert_eq!(frozen.versions[0].stats.samples, 50);
    }

    #[test]
    fn test_no_winner_before_min_samples() {
        let mut m = manager();
        m.start_ab_test("t", versions(), vec![1.0, 1.0]).unwrap();
        for _ in 0..40 {
            m.record_result("v1.0", Outcome { latency_ms: 10.0, success: true }).unwrap();
        }
        let results = m.get_ab_test_results("t").unwrap();
        assert_eq!(results.status, AbTestStatus::Running);
        assert!(results.winner.is_none());
        assert!(results.versions.iter().all(|v| v.score.is_none()));
        assert!(m.record_result("v7", Outcome { latency_ms: 1.0, success: true }).is_err());
    }
}

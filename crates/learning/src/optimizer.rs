//! The ML optimizer - coordinates the learning primitives.
//!
//! Answers "which worker should run this task, and how confident are we?"
//! and owns the learned state that survives restarts.

use crate::{
    ExplainConfig, ExplainableAI, Explanation, MultiTaskLearner, QLearningAgent, QLearningConfig,
    QLearningSnapshot, TransferConfig, TransferLearningEngine,
};
use agentune_core::{AgentuneError, Episode, Experience, Result, WorkflowData, WorkflowState, FEATURE_NAMES};
use agentune_storage::{load_typed, save_typed, LearningStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Store key of the persisted Q-table.
pub const QTABLE_KEY: &str = "qlearning/qtable";

/// Multi-task head consulted by [`MlOptimizer::predict`], trained on
/// whether observed rewards were positive.
pub const SUCCESS_TASK: &str = "success";

/// Training steps before the success head is blended into predictions.
pub const MIN_MULTITASK_STEPS: usize = 10;

const MULTITASK_LEARNING_RATE: f64 = 0.5;

const Q_WEIGHT: f64 = 0.5;
const MULTITASK_WEIGHT: f64 = 0.3;
const TRANSFER_WEIGHT: f64 = 0.2;
const HISTORY_WEIGHT: f64 = 0.2;

/// Configuration for the ML optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlOptimizerConfig {
    /// Q-learning hyper-parameters
    pub qlearning: QLearningConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Attribution settings
    pub explain: ExplainConfig,
    /// Width of the shared multi-task layer
    pub shared_layer_size: usize,
    /// Upper bound for a selection decision
    pub latency_budget_ms: u64,
    /// Replayed experiences after each training batch
    pub replay_batch: usize,
    /// Seed used by components that don't set their own
    pub seed: Option<u64>,
}

impl Default for MlOptimizerConfig {
    fn default() -> Self {
        Self {
            qlearning: QLearningConfig::default(),
            transfer: TransferConfig::default(),
            explain: ExplainConfig::default(),
            shared_layer_size: 16,
            latency_budget_ms: 50,
            replay_batch: 32,
            seed: None,
        }
    }
}

/// A worker that can take the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCandidate {
    /// Agent id
    pub id: String,
    /// Current load (0-1)
    pub load: f64,
}

impl AgentCandidate {
    /// Create a candidate.
    pub fn new(id: impl Into<String>, load: f64) -> Self {
        Self { id: id.into(), load }
    }
}

/// Outcome of an agent selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Chosen agent id
    pub selected_agent: String,
    /// Softmax probability of the choice over candidate values
    pub confidence: f64,
    /// Time spent deciding
    pub latency: Duration,
    /// True when the latency budget ran out and the least-loaded agent was used
    pub fallback: bool,
}

/// Success probability with the signals it was blended from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPrediction {
    /// Blended probability (0-1)
    pub probability: f64,
    /// Logistic of the best known Q-value
    pub q_signal: Option<f64>,
    /// Output of the multi-task success head, once it has been trained
    pub multitask_signal: Option<f64>,
    /// Performance score of the model transferred to the task type
    pub transfer_signal: Option<f64>,
    /// Historical success rate
    pub historical: f64,
}

/// Summary of an offline training batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Episodes processed
    pub episodes: usize,
    /// Updates applied
    pub steps: usize,
    /// Mean reward per step
    pub mean_reward: f64,
    /// Exploration rate after training
    pub exploration_rate: f64,
}

/// Read-only view of the learned models used to score a state.
struct Predictor<'a> {
    agent: &'a QLearningAgent,
    multitask: &'a MultiTaskLearner,
    transfer: &'a TransferLearningEngine,
}

impl Predictor<'_> {
    fn predict(&self, state: &WorkflowState) -> SuccessPrediction {
        let q_signal = self.agent.table().max_value(&state.key()).map(logistic);

        let features = state.features();
        let multitask_signal = if self.multitask.has_task(SUCCESS_TASK)
            && self.multitask.steps() >= MIN_MULTITASK_STEPS
            && self.multitask.input_size() == Some(features.len())
        {
            self.multitask
                .predict(&features, &[SUCCESS_TASK])
                .ok()
                .and_then(|out| out.get(SUCCESS_TASK).and_then(|v| v.first().copied()))
        } else {
            None
        };

        let transfer_signal = self
            .transfer
            .get_model(state.task_type())
            .map(|m| m.model.performance_score.clamp(0.0, 1.0));

        let historical = state.success_rate();
        let signals = [
            (q_signal, Q_WEIGHT),
            (multitask_signal, MULTITASK_WEIGHT),
            (transfer_signal, TRANSFER_WEIGHT),
            (Some(historical), HISTORY_WEIGHT),
        ];
        let (sum, weight) = signals
            .iter()
            .filter_map(|(s, w)| s.map(|s| (s * w, *w)))
            .fold((0.0, 0.0), |(a, b), (s, w)| (a + s, b + w));

        SuccessPrediction {
            probability: (sum / weight).clamp(0.0, 1.0),
            q_signal,
            multitask_signal,
            transfer_signal,
            historical,
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn train_success_head(multitask: &mut MultiTaskLearner, state: &WorkflowState, reward: f64) -> Result<()> {
    let target = if reward > 0.0 { 1.0 } else { 0.0 };
    let targets = BTreeMap::from([(SUCCESS_TASK.to_string(), vec![target])]);
    multitask.train_step(&state.features(), &targets, MULTITASK_LEARNING_RATE)?;
    Ok(())
}

fn effective_load(candidate: &AgentCandidate) -> f64 {
    if candidate.load.is_finite() {
        candidate.load
    } else {
        f64::INFINITY
    }
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Coordinator of the learning primitives.
pub struct MlOptimizer {
    config: MlOptimizerConfig,
    store: Option<Arc<dyn LearningStore>>,
    initialized: AtomicBool,
    qlearning: RwLock<QLearningAgent>,
    transfer: RwLock<TransferLearningEngine>,
    multitask: RwLock<MultiTaskLearner>,
    explainer: RwLock<ExplainableAI>,
}

impl MlOptimizer {
    /// Create an optimizer. Call [`initialize`](Self::initialize) before use.
    pub fn new(config: MlOptimizerConfig) -> Self {
        let seed = config.seed;
        let qlearning = QLearningConfig {
            seed: config.qlearning.seed.or(seed),
            ..config.qlearning.clone()
        };
        let transfer = TransferConfig {
            seed: config.transfer.seed.or(seed),
            ..config.transfer.clone()
        };
        let explain = ExplainConfig {
            seed: config.explain.seed.or(seed),
            ..config.explain.clone()
        };

        Self {
            store: None,
            initialized: AtomicBool::new(false),
            qlearning: RwLock::new(QLearningAgent::new(qlearning)),
            transfer: RwLock::new(TransferLearningEngine::new(transfer)),
            multitask: RwLock::new(MultiTaskLearner::new(seed)),
            explainer: RwLock::new(ExplainableAI::new(explain)),
            config,
        }
    }

    /// Persist learned state through `store`.
    pub fn with_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether [`initialize`](Self::initialize) has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AgentuneError::NotInitialized("MlOptimizer"))
        }
    }

    /// Wire sub-components and restore persisted learning state.
    ///
    /// Calling it again while initialized does nothing.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            debug!("MlOptimizer already initialized");
            return Ok(());
        }

        {
            let mut multitask = self.multitask.write().await;
            if !multitask.is_initialized() {
                multitask.initialize_shared_layers(FEATURE_NAMES.len(), self.config.shared_layer_size.max(1))?;
            }
            if !multitask.has_task(SUCCESS_TASK) {
                multitask.add_task_head(SUCCESS_TASK, 1, 1.0)?;
            }
        }

        if let Some(store) = &self.store {
            if let Some(snapshot) = load_typed::<QLearningSnapshot>(store.as_ref(), QTABLE_KEY).await? {
                info!("Restored Q-table with {} entries", snapshot.entries.len());
                self.qlearning.write().await.restore(snapshot);
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!("MlOptimizer initialized");
        Ok(())
    }

    /// Pick the agent for a workflow.
    ///
    /// If the decision does not finish within the latency budget the
    /// least-loaded candidate is returned with `fallback` set.
    pub async fn optimize_agent_selection(
        &self,
        workflow: &WorkflowData,
        candidates: &[AgentCandidate],
    ) -> Result<SelectionResult> {
        self.ensure_initialized()?;
        if candidates.is_empty() {
            return Err(AgentuneError::EmptyCandidates);
        }

        let start = Instant::now();
        let state = WorkflowState::from(workflow);
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let budget = Duration::from_millis(self.config.latency_budget_ms);

        let decision = tokio::time::timeout(budget, async {
            let mut agent = self.qlearning.write().await;
            let selected = agent.select_action(&state, &ids)?;
            let values: Vec<f64> = ids.iter().map(|id| agent.q_value(&state, id)).collect();
            Ok::<_, AgentuneError>((selected, values))
        })
        .await;

        match decision {
            Ok(Ok((selected, values))) => {
                let probabilities = softmax(&values);
                let confidence = ids
                    .iter()
                    .position(|id| *id == selected)
                    .map(|i| probabilities[i])
                    .unwrap_or(0.0);
                debug!("Selected {} for {} (confidence {:.3})", selected, state.key(), confidence);
                Ok(SelectionResult {
                    selected_agent: selected,
                    confidence,
                    latency: start.elapsed(),
                    fallback: false,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let least_loaded = candidates
                    .iter()
                    .min_by(|a, b| effective_load(a).total_cmp(&effective_load(b)))
                    .ok_or(AgentuneError::EmptyCandidates)?;
                warn!(
                    "Agent selection exceeded {}ms, falling back to {}",
                    self.config.latency_budget_ms, least_loaded.id
                );
                Ok(SelectionResult {
                    selected_agent: least_loaded.id.clone(),
                    confidence: 1.0 / candidates.len() as f64,
                    latency: start.elapsed(),
                    fallback: true,
                })
            }
        }
    }

    /// Feed back the reward observed after running `agent_id` on a workflow.
    pub async fn record_feedback(&self, workflow: &WorkflowData, agent_id: &str, reward: f64) -> Result<()> {
        self.ensure_initialized()?;
        let state = WorkflowState::from(workflow);
        train_success_head(&mut *self.multitask.write().await, &state, reward)?;
        self.qlearning
            .write()
            .await
            .update(Experience::new(state.clone(), agent_id, reward, state, true));
        Ok(())
    }

    /// Success probability of a workflow.
    pub async fn predict(&self, workflow: &WorkflowData) -> Result<SuccessPrediction> {
        self.ensure_initialized()?;
        let state = WorkflowState::from(workflow);

        let agent = self.qlearning.read().await;
        let multitask = self.multitask.read().await;
        let transfer = self.transfer.read().await;
        let predictor = Predictor {
            agent: &agent,
            multitask: &multitask,
            transfer: &transfer,
        };
        Ok(predictor.predict(&state))
    }

    /// Replay recorded episodes through the Q-learning update rule.
    ///
    /// Every episode is validated before any update is applied.
    pub async fn train_with_rl(&self, episodes: &[Episode]) -> Result<TrainingSummary> {
        self.ensure_initialized()?;

        let batches = episodes
            .iter()
            .map(Episode::experiences)
            .collect::<Result<Vec<_>>>()?;

        let mut agent = self.qlearning.write().await;
        let mut multitask = self.multitask.write().await;
        let mut steps = 0;
        let mut reward = 0.0;
        for experience in batches.into_iter().flatten() {
            reward += experience.reward;
            train_success_head(&mut multitask, &experience.state, experience.reward)?;
            agent.update(experience);
            steps += 1;
        }
        if steps > 0 {
            agent.replay(self.config.replay_batch);
        }

        let summary = TrainingSummary {
            episodes: episodes.len(),
            steps,
            mean_reward: if steps > 0 { reward / steps as f64 } else { 0.0 },
            exploration_rate: agent.exploration_rate(),
        };
        info!(
            "Trained on {} episodes ({} steps, mean reward {:.3})",
            summary.episodes, summary.steps, summary.mean_reward
        );
        Ok(summary)
    }

    /// Attribute a success prediction to the workflow features.
    pub async fn explain(&self, workflow: &WorkflowData) -> Result<Explanation> {
        self.ensure_initialized()?;
        let state = WorkflowState::from(workflow);
        let features = state.features();
        let task_type = state.task_type().to_string();

        let agent = self.qlearning.read().await;
        let multitask = self.multitask.read().await;
        let transfer = self.transfer.read().await;
        let predictor = Predictor {
            agent: &agent,
            multitask: &multitask,
            transfer: &transfer,
        };

        let mut explainer = self.explainer.write().await;
        let shap = explainer.compute_shap(&predictor, &features, |p, x| {
            p.predict(&WorkflowState::from_features(x, &task_type)).probability
        })?;
        Ok(explainer.generate_explanation(&shap.attribution, &features))
    }

    /// Save learned state to the store, if one is configured.
    pub async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = self.qlearning.read().await.snapshot();
        save_typed(store.as_ref(), QTABLE_KEY, &snapshot).await?;
        debug!("Persisted Q-table ({} entries)", snapshot.entries.len());
        Ok(())
    }

    /// Persist and return to the uninitialized state.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.persist().await?;
        self.initialized.store(false, Ordering::SeqCst);
        info!("MlOptimizer shut down");
        Ok(())
    }

    /// The Q-learning agent.
    pub fn qlearning(&self) -> &RwLock<QLearningAgent> {
        &self.qlearning
    }

    /// The transfer engine.
    pub fn transfer(&self) -> &RwLock<TransferLearningEngine> {
        &self.transfer
    }

    /// The multi-task learner.
    pub fn multitask(&self) -> &RwLock<MultiTaskLearner> {
        &self.multitask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DomainMetadata, SourceModel};
    use agentune_storage::MemoryStore;

    fn config() -> MlOptimizerConfig {
        MlOptimizerConfig {
            qlearning: QLearningConfig {
                exploration_rate: 0.0,
                min_exploration: 0.0,
                ..Default::default()
            },
            seed: Some(17),
            ..Default::default()
        }
    }

    async fn optimizer() -> MlOptimizer {
        let optimizer = MlOptimizer::new(config());
        optimizer.initialize().await.unwrap();
        optimizer
    }

    fn workflow() -> WorkflowData {
        WorkflowData::new("analysis")
            .with_complexity(50.0)
            .with_agent_load(0.5)
            .with_success_rate(0.8)
    }

    fn candidates() -> Vec<AgentCandidate> {
        vec![
            AgentCandidate::new("agent1", 0.7),
            AgentCandidate::new("agent2", 0.2),
            AgentCandidate::new("agent3", 0.5),
        ]
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let optimizer = MlOptimizer::new(config());
        assert_eq!(
            optimizer.predict(&workflow()).await,
            Err(AgentuneError::NotInitialized("MlOptimizer"))
        );
        assert!(optimizer
            .optimize_agent_selection(&workflow(), &candidates())
            .await
            .is_err());

        optimizer.initialize().await.unwrap();
        optimizer.initialize().await.unwrap();
        assert!(optimizer.predict(&workflow()).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let optimizer = optimizer().await;
        assert_eq!(
            optimizer.optimize_agent_selection(&workflow(), &[]).await,
            Err(AgentuneError::EmptyCandidates)
        );
    }

    #[tokio::test]
    async fn test_uniform_knowledge_gives_uniform_confidence() {
        let optimizer = optimizer().await;
        let result = optimizer
            .optimize_agent_selection(&workflow(), &candidates())
            .await
            .unwrap();
        assert_eq!(result.selected_agent, "agent1");
        assert!((result.confidence - 1.0 / 3.0).abs() < 1e-12);
        assert!(!result.fallback);
    }

    #[tokio::test]
    async fn test_feedback_shapes_selection() {
        let optimizer = optimizer().await;
        for _ in 0..20 {
            optimizer.record_feedback(&workflow(), "agent3", 1.0).await.unwrap();
        }
        let result = optimizer
            .optimize_agent_selection(&workflow(), &candidates())
            .await
            .unwrap();
        assert_eq!(result.selected_agent, "agent3");
        assert!(result.confidence > 1.0 / 3.0);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_least_loaded() {
        let optimizer = MlOptimizer::new(MlOptimizerConfig {
            latency_budget_ms: 10,
            ..config()
        });
        optimizer.initialize().await.unwrap();

        let _busy = optimizer.qlearning.write().await;
        let result = optimizer
            .optimize_agent_selection(&workflow(), &candidates())
            .await
            .unwrap();
        assert!(result.fallback);
        assert_eq!(result.selected_agent, "agent2");
    }

    #[tokio::test]
    async fn test_train_with_rl() {
        let optimizer = optimizer().await;
        let s = WorkflowState::from(workflow());
        let episodes = vec![Episode {
            states: vec![s.clone(), s.clone()],
            actions: vec!["agent2".into(), "agent2".into()],
            rewards: vec![1.0, 0.5],
        }];

        let summary = optimizer.train_with_rl(&episodes).await.unwrap();
        assert_eq!(summary.steps, 2);
        assert!((summary.mean_reward - 0.75).abs() < 1e-12);
        assert_eq!(optimizer.qlearning().read().await.total_steps(), 2);

        let bad = vec![
            episodes[0].clone(),
            Episode {
                states: vec![],
                actions: vec!["x".into()],
                rewards: vec![1.0],
            },
        ];
        assert!(matches!(
            optimizer.train_with_rl(&bad).await,
            Err(AgentuneError::InvalidInput(_))
        ));
        assert_eq!(optimizer.qlearning().read().await.total_steps(), 2);
    }

    #[tokio::test]
    async fn test_predict_blends_available_signals() {
        let optimizer = optimizer().await;
        let prediction = optimizer.predict(&workflow()).await.unwrap();
        assert!((prediction.probability - 0.8).abs() < 1e-12);
        assert!(prediction.q_signal.is_none());
        assert!(prediction.multitask_signal.is_none());

        for _ in 0..MIN_MULTITASK_STEPS {
            optimizer.record_feedback(&workflow(), "agent1", 2.0).await.unwrap();
        }
        {
            let mut transfer = optimizer.transfer().write().await;
            transfer.register_source_model(
                "codegen",
                SourceModel::new(vec![0.1; 4], vec![4], 0.9)
                    .with_metadata(DomainMetadata::new().with_tag("llm")),
            );
            transfer.register_domain("analysis", DomainMetadata::new().with_tag("llm"));
            transfer.transfer_knowledge("codegen", "analysis").unwrap();
        }

        let prediction = optimizer.predict(&workflow()).await.unwrap();
        assert!(prediction.q_signal.is_some());
        assert!(prediction.multitask_signal.is_some());
        assert!(prediction.transfer_signal.is_some());
        assert!((0.0..=1.0).contains(&prediction.probability));
    }

    async fn success_head_output(optimizer: &MlOptimizer) -> f64 {
        let features = WorkflowState::from(workflow()).features();
        optimizer.multitask().read().await.predict(&features, &[SUCCESS_TASK]).unwrap()[SUCCESS_TASK][0]
    }

    #[tokio::test]
    async fn test_success_head_follows_feedback() {
        let positive = optimizer().await;
        let negative = optimizer().await;
        let untrained = success_head_output(&positive).await;

        for _ in 0..30 {
            positive.record_feedback(&workflow(), "agent2", 1.0).await.unwrap();
            negative.record_feedback(&workflow(), "agent2", -1.0).await.unwrap();
        }

        let up = positive.predict(&workflow()).await.unwrap().multitask_signal.unwrap();
        let down = negative.predict(&workflow()).await.unwrap().multitask_signal.unwrap();
        assert!(up > untrained && up > 0.7, "positive feedback gave {}", up);
        assert!(down < untrained && down < 0.3, "negative feedback gave {}", down);
    }

    #[tokio::test]
    async fn test_episodes_train_success_head() {
        let optimizer = optimizer().await;
        let s = WorkflowState::from(workflow());
        let episode = Episode {
            states: vec![s.clone(); 4],
            actions: vec!["agent2".into(); 4],
            rewards: vec![1.0; 4],
        };
        optimizer.train_with_rl(&[episode.clone(), episode.clone()]).await.unwrap();
        assert!(optimizer.predict(&workflow()).await.unwrap().multitask_signal.is_none());

        optimizer.train_with_rl(&[episode]).await.unwrap();
        assert_eq!(optimizer.multitask().read().await.steps(), 12);
        let signal = optimizer.predict(&workflow()).await.unwrap().multitask_signal.unwrap();
        assert!(signal > 0.5);
    }

    #[tokio::test]
    async fn test_explain_covers_features() {
        let optimizer = optimizer().await;
        let explanation = optimizer.explain(&workflow()).await.unwrap();
        assert_eq!(explanation.attribution_vector.len(), FEATURE_NAMES.len());
        assert!(explanation
            .top_factors
            .iter()
            .any(|f| f.feature == "success_rate"));
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
        let first = MlOptimizer::new(config()).with_store(store.clone());
        first.initialize().await.unwrap();
        first.record_feedback(&workflow(), "agent3", 1.0).await.unwrap();
        first.shutdown().await.unwrap();
        assert!(!first.is_initialized());
        assert!(store.load(QTABLE_KEY).await.unwrap().is_some());

        let second = MlOptimizer::new(config()).with_store(store);
        second.initialize().await.unwrap();
        let state = WorkflowState::from(workflow());
        assert!(second.qlearning().read().await.q_value(&state, "agent3") > 0.0);
    }
}

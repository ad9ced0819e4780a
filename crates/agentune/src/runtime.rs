//! The assembled optimization core.

use crate::Settings;
use agentune_analytics::{PredictionContext, PredictiveAnalyticsEngine, WorkflowPrediction};
use agentune_core::{Configuration, ParameterSpace, WorkflowData};
use agentune_learning::{AgentCandidate, MlOptimizer, SelectionResult, SuccessPrediction};
use agentune_storage::{load_typed, JsonFileStore, LearningStore, MemoryStore};
use agentune_tuner::{AutoTuner, BEST_CONFIG_KEY};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything the orchestrator needs to dispatch one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAssessment {
    /// Chosen worker
    pub selection: SelectionResult,
    /// Learned success estimate
    pub learned: SuccessPrediction,
    /// Statistical forecast
    pub forecast: WorkflowPrediction,
}

/// ML optimizer, analytics engine and tuner factory sharing one store.
pub struct Agentune {
    settings: Settings,
    store: Arc<dyn LearningStore>,
    optimizer: MlOptimizer,
    analytics: PredictiveAnalyticsEngine,
}

impl Agentune {
    /// Assemble the core around `store`. Call [`initialize`](Self::initialize) before use.
    pub fn new(settings: Settings, store: Arc<dyn LearningStore>) -> Self {
        let optimizer = MlOptimizer::new(settings.learning.clone()).with_store(store.clone());
        let analytics = PredictiveAnalyticsEngine::new(settings.analytics.clone());
        Self {
            settings,
            store,
            optimizer,
            analytics,
        }
    }

    /// Assemble the core with a volatile in-memory store.
    pub fn in_memory(settings: Settings) -> Self {
        Self::new(settings, Arc::new(MemoryStore::new()))
    }

    /// Assemble the core over a JSON file store rooted at `root`.
    pub async fn open(settings: Settings, root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let store = JsonFileStore::new(root)
            .await
            .with_context(|| format!("Failed to open learning store at {}", root.display()))?;
        Ok(Self::new(settings, Arc::new(store)))
    }

    /// Restore learned state and start both coordinators.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.optimizer
            .initialize()
            .await
            .context("Failed to initialize ML optimizer")?;
        self.analytics
            .initialize(Some(self.store.clone()))
            .await
            .context("Failed to initialize analytics engine")?;
        info!("Agentune core initialized");
        Ok(())
    }

    /// Select a worker and forecast the workflow's outcome.
    pub async fn assess(
        &self,
        workflow: &WorkflowData,
        candidates: &[AgentCandidate],
        context: &PredictionContext,
    ) -> anyhow::Result<WorkflowAssessment> {
        let selection = self.optimizer.optimize_agent_selection(workflow, candidates).await?;
        let learned = self.optimizer.predict(workflow).await?;
        let forecast = self.analytics.predict(workflow, context).await?;
        Ok(WorkflowAssessment {
            selection,
            learned,
            forecast,
        })
    }

    /// A tuner over the default parameter space, saving into the shared store.
    pub fn tuner(&self) -> anyhow::Result<AutoTuner> {
        let space = AutoTuner::default_space()?;
        Ok(self.tuner_with_space(space))
    }

    /// A tuner over `space`, saving into the shared store.
    pub fn tuner_with_space(&self, space: ParameterSpace) -> AutoTuner {
        AutoTuner::new(self.settings.tuner.clone(), space).with_store(self.store.clone())
    }

    /// Best configuration saved by the last finished tuning run.
    pub async fn best_config(&self) -> anyhow::Result<Option<Configuration>> {
        let config: Option<Configuration> = load_typed(self.store.as_ref(), BEST_CONFIG_KEY)
            .await
            .context("Failed to load best configuration")?;
        Ok(config)
    }

    /// Persist learned state and stop both coordinators.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.optimizer.shutdown().await.context("Failed to shut down ML optimizer")?;
        self.analytics
            .shutdown()
            .await
            .context("Failed to shut down analytics engine")?;
        info!("Agentune core shut down");
        Ok(())
    }

    /// Effective settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The ML optimizer.
    pub fn optimizer(&self) -> &MlOptimizer {
        &self.optimizer
    }

    /// The analytics engine.
    pub fn analytics(&self) -> &PredictiveAnalyticsEngine {
        &self.analytics
    }
}

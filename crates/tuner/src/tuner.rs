//! The auto-tuner - searches the parameter space against live telemetry.

use crate::{
    score_stats, AnnealingConfig, BanditConfig, GeneticConfig, ObjectiveWeights, SearchStrategy, StrategyKind,
};
use agentune_core::{
    seeded_rng, AgentuneError, Configuration, ParameterSpace, ParameterSpec, PerformanceMonitor,
    PerformanceStats, RunId, Time,
};
use agentune_learning::BayesianConfig;
use agentune_storage::{save_typed, LearningStore};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Store key of the best configuration found by the last finished run.
pub const BEST_CONFIG_KEY: &str = "tuner/best_config";

/// Configuration for the auto-tuner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Search strategy
    pub strategy: StrategyKind,
    /// Iteration budget per run
    pub max_iterations: usize,
    /// Relative improvement over the baseline that ends the run
    pub target_improvement: f64,
    /// Pause between iterations (ms) while running
    pub iteration_delay_ms: u64,
    /// Bayesian strategy settings
    pub bayesian: BayesianConfig,
    /// Grid levels per numeric parameter
    pub grid_points: usize,
    /// Genetic strategy settings
    pub genetic: GeneticConfig,
    /// Annealing strategy settings
    pub annealing: AnnealingConfig,
    /// Bandit strategy settings
    pub bandit: BanditConfig,
    /// Objective weights
    pub objective: ObjectiveWeights,
    /// Seed for proposals (None = entropy)
    pub seed: Option<u64>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_iterations: 50,
            target_improvement: 0.2,
            iteration_delay_ms: 0,
            bayesian: BayesianConfig::default(),
            grid_points: 5,
            genetic: GeneticConfig::default(),
            annealing: AnnealingConfig::default(),
            bandit: BanditConfig::default(),
            objective: ObjectiveWeights::default(),
            seed: None,
        }
    }
}

/// Lifecycle of a tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningStatus {
    /// Not initialized
    Idle,
    /// Measuring the baseline
    Initializing,
    /// Evaluating configurations
    Iterating,
    /// Improvement target reached
    Converged,
    /// Budget used up, search exhausted or cancelled
    Stopped,
    /// Report produced
    Reporting,
}

/// State of the current tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRun {
    /// Run id
    pub id: RunId,
    /// Strategy name
    pub strategy: String,
    /// Iterations completed
    pub iteration: usize,
    /// Best configuration evaluated so far
    pub best_config: Option<Configuration>,
    /// Score of `best_config`
    pub best_score: Option<f64>,
    /// Score measured before tuning
    pub baseline_score: Option<f64>,
    /// Lifecycle status
    pub status: TuningStatus,
    /// When the run started
    pub started_at: Time,
}

impl TuningRun {
    fn new(strategy: &str) -> Self {
        Self {
            id: RunId::new(),
            strategy: strategy.to_string(),
            iteration: 0,
            best_config: None,
            best_score: None,
            baseline_score: None,
            status: TuningStatus::Idle,
            started_at: Utc::now(),
        }
    }

    /// Relative improvement of the best score over the baseline.
    ///
    /// Absolute difference when the baseline is zero; 0 before anything
    /// was measured.
    pub fn improvement(&self) -> f64 {
        match (self.baseline_score, self.best_score) {
            (Some(base), Some(best)) if base.abs() > f64::EPSILON => (best - base) / base.abs(),
            (Some(base), Some(best)) => best - base,
            _ => 0.0,
        }
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub iteration: usize,
    /// Configuration applied
    pub config: Configuration,
    /// Statistics observed under it
    pub stats: PerformanceStats,
    /// Objective score
    pub score: f64,
    /// Whether it became the new best
    pub new_best: bool,
    /// When it was evaluated
    pub timestamp: Time,
}

/// Result of a single tuning iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// Evaluated; tuning continues
    Continue(IterationRecord),
    /// Evaluated and the improvement target was reached
    Converged(IterationRecord),
    /// Evaluated and the iteration budget is used up
    BudgetExhausted(IterationRecord),
    /// The strategy has nothing left to propose
    SearchExhausted,
}

/// Final report of a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    /// Run state at the time of reporting
    pub run: TuningRun,
    /// Terminal status before reporting (Converged or Stopped)
    pub outcome: TuningStatus,
    /// Relative improvement over the baseline
    pub improvement: f64,
    /// Every evaluated configuration, in order
    pub history: Vec<IterationRecord>,
}

/// Applies candidate configurations to the live system.
#[async_trait]
pub trait ConfigurationSink: Send + Sync {
    /// Apply `config`.
    async fn apply(&self, config: &Configuration) -> anyhow::Result<()>;
}

/// Cooperative cancellation for [`AutoTuner::run`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the run to stop at the next iteration boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous stop request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Live configuration tuner.
///
/// Runs the tuning loop:
/// ```text
/// Propose → Apply → Measure → Score → Feed back
/// ```
pub struct AutoTuner {
    config: TunerConfig,
    space: ParameterSpace,
    strategy: Box<dyn SearchStrategy>,
    rng: StdRng,
    monitor: Option<Arc<dyn PerformanceMonitor>>,
    sink: Option<Arc<dyn ConfigurationSink>>,
    store: Option<Arc<dyn LearningStore>>,
    stop: StopHandle,
    run: TuningRun,
    history: Vec<IterationRecord>,
}

impl AutoTuner {
    /// Create a tuner over `space` using the configured strategy.
    pub fn new(config: TunerConfig, space: ParameterSpace) -> Self {
        let strategy = config.strategy.build(&config);
        let run = TuningRun::new(strategy.name());
        Self {
            rng: seeded_rng(config.seed),
            config,
            space,
            strategy,
            monitor: None,
            sink: None,
            store: None,
            stop: StopHandle::default(),
            run,
            history: Vec::new(),
        }
    }

    /// The orchestrator's default tunables.
    pub fn default_space() -> agentune_core::Result<ParameterSpace> {
        ParameterSpace::new(vec![
            ParameterSpec::integer("worker_pool", 4, 32),
            ParameterSpec::continuous("memory_threshold", 0.6, 0.9),
            ParameterSpec::integer("batch_size", 8, 256),
            ParameterSpec::integer("cache_ttl_secs", 30, 3600),
            ParameterSpec::categorical("queue_strategy", ["fifo", "priority", "fair"]),
        ])
    }

    /// Apply candidates through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ConfigurationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Save the best configuration to `store` when a run finishes.
    pub fn with_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Handle for cancelling a running [`run`](Self::run).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> TuningStatus {
        self.run.status
    }

    /// Current run state.
    pub fn run_state(&self) -> &TuningRun {
        &self.run
    }

    /// Evaluated configurations of the current run.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// The parameter space being searched.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Start a fresh run: measure the baseline and begin iterating.
    ///
    /// The search strategy keeps its state across runs. A stop requested
    /// during an earlier run is cleared.
    pub async fn initialize(&mut self, monitor: Arc<dyn PerformanceMonitor>) -> anyhow::Result<()> {
        self.run = TuningRun::new(self.strategy.name());
        self.history.clear();
        self.stop.reset();
        self.run.status = TuningStatus::Initializing;

        let stats = monitor.get_stats().await;
        let baseline = score_stats(&stats, &self.config.objective);
        self.run.baseline_score = Some(baseline);
        self.monitor = Some(monitor);
        self.run.status = TuningStatus::Iterating;

        info!(
            "Tuning run {} started: strategy={} baseline={:.4}",
            self.run.id, self.run.strategy, baseline
        );
        Ok(())
    }

    /// Propose, apply and evaluate one configuration.
    pub async fn tuning_iteration(&mut self) -> anyhow::Result<IterationOutcome> {
        if self.run.status != TuningStatus::Iterating {
            return Err(AgentuneError::NotInitialized("AutoTuner").into());
        }
        let monitor = self.monitor.clone().ok_or(AgentuneError::NotInitialized("AutoTuner"))?;

        let Some(candidate) = self.strategy.propose(&self.space, &mut self.rng) else {
            info!("Search space exhausted after {} iterations", self.run.iteration);
            self.run.status = TuningStatus::Stopped;
            return Ok(IterationOutcome::SearchExhausted);
        };
        let candidate = self.space.clamp(&candidate);

        if let Some(sink) = &self.sink {
            sink.apply(&candidate)
                .await
                .with_context(|| format!("Failed to apply configuration {}", candidate))?;
        }

        let stats = monitor.get_stats().await;
        let score = score_stats(&stats, &self.config.objective);
        self.strategy.observe(&candidate, score);
        self.run.iteration += 1;

        let new_best = self.run.best_score.map_or(true, |best| score > best);
        if new_best {
            self.run.best_score = Some(score);
            self.run.best_config = Some(candidate.clone());
        }
        debug!(
            "Iteration {}: {} scored {:.4} (best {:.4})",
            self.run.iteration,
            candidate,
            score,
            self.run.best_score.unwrap_or(score)
        );

        let record = IterationRecord {
            iteration: self.run.iteration,
            config: candidate,
            stats,
            score,
            new_best,
            timestamp: Utc::now(),
        };
        self.history.push(record.clone());

        let improvement = self.run.improvement();
        if improvement >= self.config.target_improvement {
            info!("Converged after {} iterations: improvement {:.1}%", self.run.iteration, improvement * 100.0);
            self.run.status = TuningStatus::Converged;
            Ok(IterationOutcome::Converged(record))
        } else if self.run.iteration >= self.config.max_iterations {
            info!("Iteration budget of {} reached", self.config.max_iterations);
            self.run.status = TuningStatus::Stopped;
            Ok(IterationOutcome::BudgetExhausted(record))
        } else {
            Ok(IterationOutcome::Continue(record))
        }
    }

    /// Iterate until converged, stopped or cancelled, then report.
    ///
    /// A failed iteration is logged and skipped. Failed attempts count
    /// against the iteration budget.
    pub async fn run(&mut self) -> anyhow::Result<TuningReport> {
        if self.run.status == TuningStatus::Idle {
            return Err(AgentuneError::NotInitialized("AutoTuner").into());
        }

        let mut failures = 0;
        while self.run.status == TuningStatus::Iterating {
            if self.stop.is_stopped() {
                warn!("Tuning run {} cancelled after {} iterations", self.run.id, self.run.iteration);
                self.run.status = TuningStatus::Stopped;
                break;
            }
            if let Err(e) = self.tuning_iteration().await {
                failures += 1;
                warn!("Tuning iteration failed ({} so far): {:#}", failures, e);
            }
            if self.run.status == TuningStatus::Iterating
                && self.run.iteration + failures >= self.config.max_iterations
            {
                info!("Iteration budget of {} reached", self.config.max_iterations);
                self.run.status = TuningStatus::Stopped;
            }
            if self.config.iteration_delay_ms > 0 && self.run.status == TuningStatus::Iterating {
                tokio::time::sleep(Duration::from_millis(self.config.iteration_delay_ms)).await;
            }
        }

        self.finish().await
    }

    /// Produce the report and persist the best configuration.
    pub async fn finish(&mut self) -> anyhow::Result<TuningReport> {
        let outcome = match self.run.status {
            TuningStatus::Converged => TuningStatus::Converged,
            TuningStatus::Idle => return Err(AgentuneError::NotInitialized("AutoTuner").into()),
            _ => TuningStatus::Stopped,
        };
        self.run.status = TuningStatus::Reporting;

        if let (Some(store), Some(best)) = (&self.store, &self.run.best_config) {
            save_typed(store.as_ref(), BEST_CONFIG_KEY, best)
                .await
                .context("Failed to save best configuration")?;
        }

        let improvement = self.run.improvement();
        info!(
            "Tuning run {} finished: {} iterations, improvement {:.1}%",
            self.run.id,
            self.run.iteration,
            improvement * 100.0
        );

        Ok(TuningReport {
            run: self.run.clone(),
            outcome,
            improvement,
            history: self.history.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentune_storage::{load_typed, MemoryStore};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    type Applied = Arc<Mutex<Option<Configuration>>>;

    /// Response time grows with the distance of `worker_pool` from 16.
    struct MockMonitor {
        applied: Applied,
        calls: AtomicUsize,
        stop_at: Option<(usize, StopHandle)>,
    }

    impl MockMonitor {
        fn new(applied: Applied) -> Self {
            Self {
                applied,
                calls: AtomicUsize::new(0),
                stop_at: None,
            }
        }
    }

    #[async_trait]
    impl PerformanceMonitor for MockMonitor {
        async fn get_stats(&self) -> PerformanceStats {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, handle)) = &self.stop_at {
                if calls >= *at {
                    handle.stop();
                }
            }
            let response = match self.applied.lock().unwrap().as_ref() {
                Some(config) => {
                    let workers = config.get_i64("worker_pool").unwrap_or(4);
                    100.0 + 50.0 * (workers - 16).abs() as f64
                }
                None => 2000.0,
            };
            PerformanceStats {
                avg_response_time: response,
                total_requests: calls as u64,
                memory_utilization: 0.5,
                cpu_usage: 0.5,
            }
        }
    }

    struct MockSink {
        applied: Applied,
        count: AtomicUsize,
    }

    #[async_trait]
    impl ConfigurationSink for MockSink {
        async fn apply(&self, config: &Configuration) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.applied.lock().unwrap() = Some(config.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ConfigurationSink for FailingSink {
        async fn apply(&self, _config: &Configuration) -> anyhow::Result<()> {
            anyhow::bail!("orchestrator unavailable")
        }
    }

    /// Rejects exactly one apply call, the `fail_on`-th.
    struct FlakySink {
        applied: Applied,
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl ConfigurationSink for FlakySink {
        async fn apply(&self, config: &Configuration) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                anyhow::bail!("orchestrator busy");
            }
            *self.applied.lock().unwrap() = Some(config.clone());
            Ok(())
        }
    }

    fn small_space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::integer("worker_pool", 4, 32),
            ParameterSpec::categorical("queue_strategy", ["fifo", "priority", "fair"]),
        ])
        .unwrap()
    }

    fn setup(config: TunerConfig, space: ParameterSpace) -> (AutoTuner, Arc<MockMonitor>, Arc<MockSink>) {
        let applied: Applied = Arc::new(Mutex::new(None));
        let monitor = Arc::new(MockMonitor::new(applied.clone()));
        let sink = Arc::new(MockSink {
            applied,
            count: AtomicUsize::new(0),
        });
        let tuner = AutoTuner::new(config, space).with_sink(sink.clone());
        (tuner, monitor, sink)
    }

    fn grid_config(target: f64, max_iterations: usize) -> TunerConfig {
        TunerConfig {
            strategy: StrategyKind::Grid,
            target_improvement: target,
            max_iterations,
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_space() {
        let space = AutoTuner::default_space().unwrap();
        assert_eq!(space.len(), 5);
        assert!(space.get("cache_ttl_secs").is_some());
        assert!(space.get("queue_strategy").is_some());
    }

    #[tokio::test]
    async fn test_iteration_requires_initialize() {
        let (mut tuner, _, _) = setup(TunerConfig::default(), small_space());
        assert_eq!(tuner.status(), TuningStatus::Idle);
        let err = tuner.tuning_iteration().await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
        assert!(tuner.run().await.is_err());
    }

    #[tokio::test]
    async fn test_grid_run_converges() {
        let store = Arc::new(MemoryStore::new());
        let (tuner, monitor, sink) = setup(grid_config(0.5, 50), small_space());
        let mut tuner = tuner.with_store(store.clone());

        tuner.initialize(monitor).await.unwrap();
        assert_eq!(tuner.status(), TuningStatus::Iterating);
        let report = tuner.run().await.unwrap();

        // worker_pool levels are 4, 11, 18, ...; 18 is the first to clear 50%.
        assert_eq!(report.outcome, TuningStatus::Converged);
        assert_eq!(report.run.status, TuningStatus::Reporting);
        assert_eq!(report.history.len(), 7);
        assert_eq!(sink.count.load(Ordering::SeqCst), 7);
        let best = report.run.best_config.clone().unwrap();
        assert_eq!(best.get_i64("worker_pool"), Some(18));
        assert!(report.improvement >= 0.5);

        let saved: Option<Configuration> = load_typed(store.as_ref(), BEST_CONFIG_KEY).await.unwrap();
        assert_eq!(saved, Some(best));
    }

    #[tokio::test]
    async fn test_budget_stops_run() {
        let (mut tuner, monitor, _) = setup(
            TunerConfig {
                strategy: StrategyKind::Bandit,
                target_improvement: 10.0,
                max_iterations: 5,
                seed: Some(3),
                ..Default::default()
            },
            small_space(),
        );
        tuner.initialize(monitor).await.unwrap();
        let report = tuner.run().await.unwrap();

        assert_eq!(report.outcome, TuningStatus::Stopped);
        assert_eq!(report.run.iteration, 5);
        assert!(report.run.best_score.unwrap() > report.run.baseline_score.unwrap());
    }

    #[tokio::test]
    async fn test_exhausted_grid_stops_run() {
        let space = ParameterSpace::new(vec![ParameterSpec::categorical("queue_strategy", ["fifo", "priority", "fair"])])
            .unwrap();
        let (mut tuner, monitor, _) = setup(grid_config(10.0, 50), space);
        tuner.initialize(monitor).await.unwrap();

        let mut outcomes = Vec::new();
        while tuner.status() == TuningStatus::Iterating {
            outcomes.push(tuner.tuning_iteration().await.unwrap());
        }
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.last(), Some(&IterationOutcome::SearchExhausted));
        assert_eq!(tuner.status(), TuningStatus::Stopped);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_best() {
        let applied: Applied = Arc::new(Mutex::new(None));
        let mut tuner = AutoTuner::new(grid_config(10.0, 50), small_space()).with_sink(Arc::new(MockSink {
            applied: applied.clone(),
            count: AtomicUsize::new(0),
        }));
        let monitor = Arc::new(MockMonitor {
            applied,
            calls: AtomicUsize::new(0),
            stop_at: Some((3, tuner.stop_handle())),
        });

        tuner.initialize(monitor).await.unwrap();
        let report = tuner.run().await.unwrap();

        // Baseline is call 1; the stop lands during iteration 2.
        assert_eq!(report.outcome, TuningStatus::Stopped);
        assert_eq!(report.history.len(), 2);
        assert!(report.run.best_config.is_some());
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let applied: Applied = Arc::new(Mutex::new(None));
        let mut tuner = AutoTuner::new(grid_config(0.5, 50), small_space()).with_sink(Arc::new(FailingSink));
        tuner.initialize(Arc::new(MockMonitor::new(applied))).await.unwrap();

        let err = tuner.tuning_iteration().await.unwrap_err();
        assert!(format!("{:#}", err).contains("orchestrator unavailable"));
        assert_eq!(tuner.status(), TuningStatus::Iterating);
        assert!(tuner.history().is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_cancellation() {
        let applied: Applied = Arc::new(Mutex::new(None));
        let mut tuner = AutoTuner::new(grid_config(10.0, 4), small_space()).with_sink(Arc::new(MockSink {
            applied: applied.clone(),
            count: AtomicUsize::new(0),
        }));
        let cancelling = Arc::new(MockMonitor {
            applied: applied.clone(),
            calls: AtomicUsize::new(0),
            stop_at: Some((3, tuner.stop_handle())),
        });
        tuner.initialize(cancelling).await.unwrap();
        let first = tuner.run().await.unwrap();
        assert_eq!(first.history.len(), 2);
        assert!(tuner.stop_handle().is_stopped());

        tuner.initialize(Arc::new(MockMonitor::new(applied))).await.unwrap();
        assert!(!tuner.stop_handle().is_stopped());
        let second = tuner.run().await.unwrap();
        assert_eq!(second.outcome, TuningStatus::Stopped);
        assert_eq!(second.history.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_apply_skips_iteration() {
        let store = Arc::new(MemoryStore::new());
        let applied: Applied = Arc::new(Mutex::new(None));
        let sink = Arc::new(FlakySink {
            applied: applied.clone(),
            calls: AtomicUsize::new(0),
            fail_on: 4,
        });
        let mut tuner = AutoTuner::new(grid_config(10.0, 8), small_space())
            .with_sink(sink)
            .with_store(store.clone());
        tuner.initialize(Arc::new(MockMonitor::new(applied))).await.unwrap();

        let report = tuner.run().await.unwrap();
        assert_eq!(report.outcome, TuningStatus::Stopped);
        assert_eq!(report.history.len(), 7);
        assert_eq!(report.history[3].iteration, 4);
        let best = report.run.best_config.clone().unwrap();
        let saved: Option<Configuration> = load_typed(store.as_ref(), BEST_CONFIG_KEY).await.unwrap();
        assert_eq!(saved, Some(best));
    }

    #[tokio::test]
    async fn test_failing_sink_ends_run() {
        let applied: Applied = Arc::new(Mutex::new(None));
        let mut tuner = AutoTuner::new(grid_config(0.5, 3), small_space()).with_sink(Arc::new(FailingSink));
        tuner.initialize(Arc::new(MockMonitor::new(applied))).await.unwrap();

        let report = tuner.run().await.unwrap();
        assert_eq!(report.outcome, TuningStatus::Stopped);
        assert!(report.history.is_empty());
        assert_eq!(report.run.best_config, None);
    }
}

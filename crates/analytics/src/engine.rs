//! The predictive analytics engine - coordinates the analytics primitives.

use crate::{
    AnomalyConfig, AnomalyDetector, AnomalyScore, BottleneckDetector, BottleneckReport, BottleneckThresholds,
    BudgetForecast, CompletionForecast, CostAnalysis, CostConfig, CostOptimizer, CostPeriod, CostRecord, Forecast,
    ForecasterConfig, ResourceUsage, SuccessForecast, SystemMetrics, TaskMeta, TimeSeriesForecaster, TrendConfig,
    TrendAnalyzer, TrendReport,
};
use agentune_core::{AgentuneError, Metrics, Result, Time, WorkflowData, WorkflowState};
use agentune_storage::{load_typed, save_typed, LearningStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Store key of the persisted cost history.
pub const COST_HISTORY_KEY: &str = "analytics/cost_history";

/// Configuration for the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Forecaster settings
    pub forecaster: ForecasterConfig,
    /// Bottleneck thresholds
    pub bottleneck: BottleneckThresholds,
    /// Cost analysis settings
    pub cost: CostConfig,
    /// Anomaly detector settings
    pub anomaly: AnomalyConfig,
    /// Trend analysis settings
    pub trend: TrendConfig,
    /// Upper bound for a prediction
    pub latency_budget_ms: u64,
    /// Seed used by components that don't set their own
    pub seed: Option<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            forecaster: ForecasterConfig::default(),
            bottleneck: BottleneckThresholds::default(),
            cost: CostConfig::default(),
            anomaly: AnomalyConfig::default(),
            trend: TrendConfig::default(),
            latency_budget_ms: 100,
            seed: None,
        }
    }
}

/// Extra inputs to a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionContext {
    /// Deadline in seconds; enables `meets_deadline`
    pub deadline_secs: Option<f64>,
    /// Overrides the engine's latency budget
    pub latency_budget_ms: Option<u64>,
}

/// Combined forecast for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPrediction {
    /// Success forecast
    pub success: Forecast<SuccessForecast>,
    /// Completion-time forecast
    pub completion: Forecast<CompletionForecast>,
    /// Whether the expected completion fits the deadline
    pub meets_deadline: Option<bool>,
    /// True when the latency budget ran out
    pub degraded: bool,
    /// Time spent predicting
    pub latency: Duration,
}

/// Bottlenecks, anomaly score and trends in one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Bottleneck analysis
    pub bottlenecks: BottleneckReport,
    /// Anomaly score of the probe, when a baseline exists
    pub anomaly: Option<AnomalyScore>,
    /// Metric trends
    pub trends: TrendReport,
}

/// Coordinator of the analytics primitives.
pub struct PredictiveAnalyticsEngine {
    config: AnalyticsConfig,
    store: RwLock<Option<Arc<dyn LearningStore>>>,
    initialized: AtomicBool,
    forecaster: RwLock<TimeSeriesForecaster>,
    bottlenecks: BottleneckDetector,
    cost: RwLock<CostOptimizer>,
    anomaly: RwLock<AnomalyDetector>,
    trend: RwLock<TrendAnalyzer>,
}

impl PredictiveAnalyticsEngine {
    /// Create an engine. Call [`initialize`](Self::initialize) before use.
    pub fn new(config: AnalyticsConfig) -> Self {
        let anomaly = AnomalyConfig {
            seed: config.anomaly.seed.or(config.seed),
            ..config.anomaly.clone()
        };
        Self {
            store: RwLock::new(None),
            initialized: AtomicBool::new(false),
            forecaster: RwLock::new(TimeSeriesForecaster::new(config.forecaster.clone())),
            bottlenecks: BottleneckDetector::new(config.bottleneck.clone()),
            cost: RwLock::new(CostOptimizer::new(config.cost.clone())),
            anomaly: RwLock::new(AnomalyDetector::new(anomaly)),
            trend: RwLock::new(TrendAnalyzer::new(config.trend.clone())),
            config,
        }
    }

    /// Whether [`initialize`](Self::initialize) has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AgentuneError::NotInitialized("PredictiveAnalyticsEngine"))
        }
    }

    /// Attach the shared store and restore cost history from it.
    ///
    /// Calling it again while initialized does nothing.
    pub async fn initialize(&self, store: Option<Arc<dyn LearningStore>>) -> Result<()> {
        if self.is_initialized() {
            debug!("PredictiveAnalyticsEngine already initialized");
            return Ok(());
        }

        if let Some(store) = &store {
            if let Some(history) = load_typed::<Vec<CostRecord>>(store.as_ref(), COST_HISTORY_KEY).await? {
                info!("Restored {} cost records", history.len());
                self.cost.write().await.restore_history(history);
            }
        }
        *self.store.write().await = store;

        self.initialized.store(true, Ordering::SeqCst);
        info!("PredictiveAnalyticsEngine initialized");
        Ok(())
    }

    /// Record a metric sample for forecasting and trend analysis.
    pub async fn record_metrics(&self, timestamp: Time, metrics: Metrics) -> Result<()> {
        self.ensure_initialized()?;
        self.trend.write().await.add_data_point(timestamp, metrics.clone());
        self.forecaster.write().await.add_data_point(timestamp, metrics);
        Ok(())
    }

    /// Success and completion forecasts for a workflow.
    ///
    /// If the latency budget runs out, both forecasts report insufficient
    /// data and `degraded` is set.
    pub async fn predict(&self, workflow: &WorkflowData, context: &PredictionContext) -> Result<WorkflowPrediction> {
        self.ensure_initialized()?;
        let start = Instant::now();
        let state = WorkflowState::from(workflow);
        let task = TaskMeta::from(&state);
        let budget = Duration::from_millis(context.latency_budget_ms.unwrap_or(self.config.latency_budget_ms));

        let forecasts = tokio::time::timeout(budget, async {
            let forecaster = self.forecaster.read().await;
            (
                forecaster.predict_workflow_success(&state),
                forecaster.predict_completion_time(&task),
            )
        })
        .await;

        let (success, completion, degraded) = match forecasts {
            Ok((success, completion)) => (success, completion, false),
            Err(_) => {
                warn!("Analytics prediction exceeded {}ms, returning degraded result", budget.as_millis());
                let need = self.config.forecaster.min_data_points;
                (
                    Forecast::InsufficientData { have: 0, need },
                    Forecast::InsufficientData { have: 0, need },
                    true,
                )
            }
        };

        let meets_deadline = match (context.deadline_secs, completion.ready()) {
            (Some(deadline), Some(c)) => Some(c.estimated_time <= deadline),
            _ => None,
        };

        Ok(WorkflowPrediction {
            success,
            completion,
            meets_deadline,
            degraded,
            latency: start.elapsed(),
        })
    }

    /// Detect bottlenecks in a system snapshot.
    pub fn detect_bottlenecks(&self, metrics: &SystemMetrics) -> Result<BottleneckReport> {
        self.ensure_initialized()?;
        let report = self.bottlenecks.detect_bottlenecks(metrics);
        if !report.bottlenecks.is_empty() {
            info!(
                "Detected {} bottlenecks (max severity {:.2})",
                report.bottlenecks.len(),
                report.stats.max_severity
            );
        }
        Ok(report)
    }

    /// Price resource usage and suggest savings.
    pub async fn analyze_costs(&self, usage: &ResourceUsage, period: CostPeriod) -> Result<CostAnalysis> {
        self.ensure_initialized()?;
        Ok(self.cost.write().await.analyze_costs(usage, period))
    }

    /// Extrapolate spend for the next `horizon_days` days.
    pub async fn forecast_budget(&self, horizon_days: u32) -> Result<BudgetForecast> {
        self.ensure_initialized()?;
        Ok(self.cost.read().await.forecast_budget(horizon_days))
    }

    /// Learn the anomaly baseline.
    pub async fn initialize_anomaly_baseline(&self, samples: &[Vec<f64>]) -> Result<()> {
        self.ensure_initialized()?;
        self.anomaly.write().await.initialize(samples)?;
        info!("Anomaly baseline learned from {} samples", samples.len());
        Ok(())
    }

    /// Score a sample against the anomaly baseline.
    pub async fn detect_anomalies(&self, sample: &[f64]) -> Result<AnomalyScore> {
        self.ensure_initialized()?;
        let score = self.anomaly.read().await.detect_anomalies(sample)?;
        if score.is_anomaly {
            warn!("Anomalous sample (score {:.3})", score.score);
        }
        Ok(score)
    }

    /// Trends of all recorded metrics.
    pub async fn analyze_trends(&self) -> Result<TrendReport> {
        self.ensure_initialized()?;
        Ok(self.trend.read().await.analyze_trends())
    }

    /// Bottlenecks, an anomaly score for `probe` and trends in one call.
    ///
    /// The anomaly score is omitted without a probe or a learned baseline.
    pub async fn health_report(&self, system: &SystemMetrics, probe: Option<&[f64]>) -> Result<HealthReport> {
        let bottlenecks = self.detect_bottlenecks(system)?;
        let anomaly = match probe {
            Some(sample) => {
                let detector = self.anomaly.read().await;
                if detector.is_initialized() {
                    Some(detector.detect_anomalies(sample)?)
                } else {
                    None
                }
            }
            None => None,
        };
        Ok(HealthReport {
            bottlenecks,
            anomaly,
            trends: self.analyze_trends().await?,
        })
    }

    /// Persist cost history and return to the uninitialized state.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        if let Some(store) = self.store.read().await.as_ref() {
            let history = self.cost.read().await.history();
            save_typed(store.as_ref(), COST_HISTORY_KEY, &history).await?;
            debug!("Persisted {} cost records", history.len());
        }
        self.initialized.store(false, Ordering::SeqCst);
        info!("PredictiveAnalyticsEngine shut down");
        Ok(())
    }
}

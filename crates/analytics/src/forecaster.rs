//! Rolling-window forecasting of workflow outcomes.

use crate::stats::{mean, std_dev};
use agentune_core::{Metrics, Time, WorkflowState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Metric holding per-run success (1) or failure (0).
pub const SUCCESS_METRIC: &str = "success";

/// Metric holding per-run duration in seconds.
pub const DURATION_METRIC: &str = "duration";

/// z-value of a 95% interval.
const Z_95: f64 = 1.96;

/// Logit penalty per unit of agent load above 0.5.
const LOAD_PENALTY: f64 = 1.0;

/// Logit penalty per unit of normalized complexity above 0.5.
const COMPLEXITY_PENALTY: f64 = 1.0;

/// A forecast, or the reason there is none yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Forecast<T> {
    /// Not enough history to forecast
    InsufficientData {
        /// Samples available
        have: usize,
        /// Samples required
        need: usize,
    },
    /// Forecast available
    Ready(T),
}

impl<T> Forecast<T> {
    /// Whether a forecast was produced.
    pub fn is_ready(&self) -> bool {
        matches!(self, Forecast::Ready(_))
    }

    /// The forecast, if any.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Forecast::Ready(v) => Some(v),
            Forecast::InsufficientData { .. } => None,
        }
    }
}

/// Forecaster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    /// Window capacity
    pub window_size: usize,
    /// Samples needed before forecasting
    pub min_data_points: usize,
    /// Level smoothing factor α
    pub level_smoothing: f64,
    /// Trend smoothing factor β
    pub trend_smoothing: f64,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            min_data_points: 10,
            level_smoothing: 0.3,
            trend_smoothing: 0.1,
        }
    }
}

/// One timestamped sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Sample time
    pub timestamp: Time,
    /// Metric values
    pub metrics: Metrics,
}

/// Predicted success of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessForecast {
    /// Success probability (0-1)
    pub probability: f64,
    /// Confidence in the estimate (0-1)
    pub confidence: f64,
    /// Time spent forecasting
    pub latency: Duration,
}

/// Task description for completion-time estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    /// Task type
    pub task_type: String,
    /// Complexity on a 0-100 scale
    pub complexity: f64,
}

impl TaskMeta {
    /// Create a task description.
    pub fn new(task_type: impl Into<String>, complexity: f64) -> Self {
        Self {
            task_type: task_type.into(),
            complexity,
        }
    }
}

impl From<&WorkflowState> for TaskMeta {
    fn from(state: &WorkflowState) -> Self {
        Self::new(state.task_type(), state.complexity())
    }
}

/// Predicted completion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionForecast {
    /// Expected duration in seconds
    pub estimated_time: f64,
    /// 95% interval `(low, high)`, `low >= 0`
    pub confidence_interval: (f64, f64),
}

/// Holt linear extrapolation of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricForecast {
    /// Metric name
    pub metric: String,
    /// Predicted values for steps `1..=horizon`
    pub values: Vec<f64>,
    /// Final smoothed level
    pub level: f64,
    /// Final smoothed per-step trend
    pub trend: f64,
}

/// Fixed-capacity window of samples with simple forecasts on top.
pub struct TimeSeriesForecaster {
    config: ForecasterConfig,
    window: VecDeque<DataPoint>,
}

impl TimeSeriesForecaster {
    /// Create an empty forecaster.
    pub fn new(config: ForecasterConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn add_data_point(&mut self, timestamp: Time, metrics: Metrics) {
        self.window.push_back(DataPoint { timestamp, metrics });
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }
    }

    /// Samples in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Oldest sample still in the window.
    pub fn oldest(&self) -> Option<&DataPoint> {
        self.window.front()
    }

    fn series(&self, metric: &str) -> Vec<f64> {
        self.window
            .iter()
            .filter_map(|p| p.metrics.get(metric).copied())
            .filter(|v| v.is_finite())
            .collect()
    }

    fn require<T>(&self, values: &[f64], need: usize) -> Option<Forecast<T>> {
        (values.len() < need).then(|| Forecast::InsufficientData {
            have: values.len(),
            need,
        })
    }

    /// Success probability from the smoothed success history, shifted by
    /// the workflow's load and complexity.
    pub fn predict_workflow_success(&self, state: &WorkflowState) -> Forecast<SuccessForecast> {
        let start = Instant::now();
        let values: Vec<f64> = self
            .series(SUCCESS_METRIC)
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0))
            .collect();
        if let Some(insufficient) = self.require(&values, self.config.min_data_points) {
            return insufficient;
        }

        let alpha = self.config.level_smoothing.clamp(0.0, 1.0);
        let smoothed = values[1..]
            .iter()
            .fold(values[0], |level, v| alpha * v + (1.0 - alpha) * level)
            .clamp(0.01, 0.99);

        let logit = (smoothed / (1.0 - smoothed)).ln()
            - LOAD_PENALTY * (state.agent_load() - 0.5)
            - COMPLEXITY_PENALTY * (state.complexity() / 100.0 - 0.5);
        let probability = 1.0 / (1.0 + (-logit).exp());

        let n = values.len() as f64;
        let fill = n / (n + self.config.min_data_points as f64);
        let confidence = (fill * (1.0 - std_dev(&values))).clamp(0.0, 1.0);

        Forecast::Ready(SuccessForecast {
            probability,
            confidence,
            latency: start.elapsed(),
        })
    }

    /// Expected duration of a task from the duration history, scaled by
    /// its complexity.
    pub fn predict_completion_time(&self, task: &TaskMeta) -> Forecast<CompletionForecast> {
        let values: Vec<f64> = self
            .series(DURATION_METRIC)
            .into_iter()
            .filter(|v| *v >= 0.0)
            .collect();
        if let Some(insufficient) = self.require(&values, self.config.min_data_points) {
            return insufficient;
        }

        let scale = 0.5 + task.complexity.clamp(0.0, 100.0) / 100.0;
        let estimated_time = mean(&values) * scale;
        let spread = Z_95 * std_dev(&values) * scale;

        Forecast::Ready(CompletionForecast {
            estimated_time,
            confidence_interval: ((estimated_time - spread).max(0.0), estimated_time + spread),
        })
    }

    /// Extrapolate `metric` for `horizon` steps with Holt linear smoothing.
    pub fn forecast_metric(&self, metric: &str, horizon: usize) -> Forecast<MetricForecast> {
        let values = self.series(metric);
        if let Some(insufficient) = self.require(&values, self.config.min_data_points.max(2)) {
            return insufficient;
        }

        let alpha = self.config.level_smoothing.clamp(0.0, 1.0);
        let beta = self.config.trend_smoothing.clamp(0.0, 1.0);
        let mut level = values[0];
        let mut trend = values[1] - values[0];
        for v in &values[1..] {
            let previous = level;
            level = alpha * v + (1.0 - alpha) * (level + trend);
            trend = beta * (level - previous) + (1.0 - beta) * trend;
        }

        Forecast::Ready(MetricForecast {
            metric: metric.to_string(),
            values: (1..=horizon).map(|h| level + h as f64 * trend).collect(),
            level,
            trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentune_core::WorkflowData;
    use chrono::Utc;

    fn sample(metric: &str, value: f64) -> Metrics {
        Metrics::from([(metric.to_string(), value)])
    }

    fn state(complexity: f64, load: f64) -> WorkflowState {
        WorkflowState::from(
            WorkflowData::new("analysis")
                .with_complexity(complexity)
                .with_agent_load(load),
        )
    }

    #[test]
    fn test_insufficient_before_min_fill() {
        let mut f = TimeSeriesForecaster::new(ForecasterConfig::default());
        for _ in 0..9 {
            f.add_data_point(Utc::now(), sample(SUCCESS_METRIC, 1.0));
        }
        assert_eq!(
            f.predict_workflow_success(&state(50.0, 0.5)),
            Forecast::InsufficientData { have: 9, need: 10 }
        );
        f.add_data_point(Utc::now(), sample(SUCCESS_METRIC, 1.0));
        assert!(f.predict_workflow_success(&state(50.0, 0.5)).is_ready());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut f = TimeSeriesForecaster::new(ForecasterConfig {
            window_size: 3,
            ..Default::default()
        });
        for i in 0..5 {
            f.add_data_point(Utc::now(), sample("x", i as f64));
        }
        assert_eq!(f.len(), 3);
        assert_eq!(f.oldest().unwrap().metrics["x"], 2.0);
    }

    #[test]
    fn test_success_depends_on_load_and_complexity() {
        let mut f = TimeSeriesForecaster::new(ForecasterConfig::default());
        for i in 0..20 {
            f.add_data_point(Utc::now(), sample(SUCCESS_METRIC, if i % 5 == 0 { 0.0 } else { 1.0 }));
        }
        let easy = f.predict_workflow_success(&state(10.0, 0.1));
        let hard = f.predict_workflow_success(&state(90.0, 0.9));
        let (easy, hard) = (easy.ready().unwrap(), hard.ready().unwrap());
        assert!(easy.probability > hard.probability);
        assert!((0.0..=1.0).contains(&easy.confidence));
    }

    #[test]
    fn test_completion_time_interval() {
        let mut f = TimeSeriesForecaster::new(ForecasterConfig::default());
        for i in 0..10 {
            f.add_data_point(Utc::now(), sample(DURATION_METRIC, if i % 2 == 0 { 90.0 } else { 110.0 }));
        }
        let forecast = f.predict_completion_time(&TaskMeta::new("analysis", 50.0));
        let forecast = forecast.ready().unwrap();
        assert!((forecast.estimated_time - 100.0).abs() < 1e-9);
        let (low, high) = forecast.confidence_interval;
        assert!((low - 80.4).abs() < 1e-9);
        assert!((high - 119.6).abs() < 1e-9);

        let trivial = f.predict_completion_time(&TaskMeta::new("analysis", 0.0));
        assert!((trivial.ready().unwrap().estimated_time - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_metric_follows_trend() {
        let mut f = TimeSeriesForecaster::new(ForecasterConfig::default());
        for i in 0..30 {
            f.add_data_point(Utc::now(), sample("latency", 100.0 + 2.0 * i as f64));
        }
        let forecast = f.forecast_metric("latency", 3);
        let forecast = forecast.ready().unwrap();
        assert_eq!(forecast.values.len(), 3);
        assert!((forecast.trend - 2.0).abs() < 1e-6);
        assert!((forecast.values[0] - 160.0).abs() < 1e-6);

        assert!(!f.forecast_metric("missing", 3).is_ready());
    }

    proptest::proptest! {
        #[test]
        fn prop_completion_interval_is_ordered(
            durations in proptest::collection::vec(0.0f64..1000.0, 10..50),
            complexity in -10.0f64..150.0,
        ) {
            let mut f = TimeSeriesForecaster::new(ForecasterConfig::default());
            for d in durations {
                f.add_data_point(Utc::now(), sample(DURATION_METRIC, d));
            }
            let forecast = f.predict_completion_time(&TaskMeta::new("t", complexity));
            let c = forecast.ready().unwrap();
            let (low, high) = c.confidence_interval;
            proptest::prop_assert!(low >= 0.0);
            proptest::prop_assert!(low <= c.estimated_time + 1e-9);
            proptest::prop_assert!(c.estimated_time <= high + 1e-9);
        }
    }
}

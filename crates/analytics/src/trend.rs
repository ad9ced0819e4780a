//! Per-metric trend and seasonality analysis.

use crate::stats::{linear_fit, mean};
use agentune_core::{Metrics, Time};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Metric name fragments for which a falling value is an improvement.
const LOWER_IS_BETTER: [&str; 7] = ["latency", "response_time", "duration", "error", "cost", "cpu", "memory"];

/// Trend analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Samples kept
    pub window_size: usize,
    /// Samples per metric before a trend is reported
    pub min_points: usize,
    /// Samples per metric before seasonality is checked
    pub seasonality_min_points: usize,
    /// Autocorrelation needed to report a season
    pub seasonality_threshold: f64,
    /// Fit quality below which a trend is stable
    pub min_r_squared: f64,
    /// Relative per-sample change below which a trend is stable
    pub min_relative_slope: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            min_points: 3,
            seasonality_min_points: 24,
            seasonality_threshold: 0.5,
            min_r_squared: 0.3,
            min_relative_slope: 0.001,
        }
    }
}

/// Direction of a metric over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Moving the desirable way
    Improving,
    /// Moving the undesirable way
    Degrading,
    /// No significant movement
    Stable,
}

/// A repeating pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// Period in samples
    pub period: usize,
    /// Autocorrelation at that period
    pub strength: f64,
}

/// Trend of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    /// Metric name
    pub metric: String,
    /// Least-squares change per sample
    pub slope: f64,
    /// Goodness of fit (0-1)
    pub r_squared: f64,
    /// Interpreted direction
    pub direction: TrendDirection,
    /// Detected seasonality, if any
    pub seasonality: Option<Seasonality>,
}

/// All metric trends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Trends, sorted by metric name
    pub trends: Vec<MetricTrend>,
    /// Samples in the window
    pub samples: usize,
}

impl TrendReport {
    /// Trend of `metric`, if reported.
    pub fn get(&self, metric: &str) -> Option<&MetricTrend> {
        self.trends.iter().find(|t| t.metric == metric)
    }
}

/// Rolling trend analyzer.
pub struct TrendAnalyzer {
    config: TrendConfig,
    window: VecDeque<(Time, Metrics)>,
}

impl TrendAnalyzer {
    /// Create an empty analyzer.
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn add_data_point(&mut self, timestamp: Time, metrics: Metrics) {
        self.window.push_back((timestamp, metrics));
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }
    }

    /// Trend of every metric with enough samples.
    pub fn analyze_trends(&self) -> TrendReport {
        let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (_, metrics) in &self.window {
            for (name, value) in metrics {
                if value.is_finite() {
                    series.entry(name.as_str()).or_default().push(*value);
                }
            }
        }

        let trends = series
            .into_iter()
            .filter(|(_, values)| values.len() >= self.config.min_points.max(2))
            .filter_map(|(name, values)| {
                let fit = linear_fit(&values)?;
                Some(MetricTrend {
                    metric: name.to_string(),
                    slope: fit.slope,
                    r_squared: fit.r_squared,
                    direction: self.direction(name, fit.slope, fit.r_squared, mean(&values)),
                    seasonality: self.seasonality(&values, fit.slope, fit.intercept),
                })
            })
            .collect();

        TrendReport {
            trends,
            samples: self.window.len(),
        }
    }

    fn direction(&self, metric: &str, slope: f64, r_squared: f64, level: f64) -> TrendDirection {
        let relative = slope / level.abs().max(1e-9);
        if r_squared < self.config.min_r_squared || relative.abs() < self.config.min_relative_slope {
            return TrendDirection::Stable;
        }
        let lower_is_better = LOWER_IS_BETTER.iter().any(|f| metric.contains(f));
        if (slope > 0.0) != lower_is_better {
            TrendDirection::Improving
        } else {
            TrendDirection::Degrading
        }
    }

    /// Strongest autocorrelation of the detrended series.
    fn seasonality(&self, values: &[f64], slope: f64, intercept: f64) -> Option<Seasonality> {
        let n = values.len();
        if n < self.config.seasonality_min_points.max(4) {
            return None;
        }

        let residuals: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(i, v)| v - (intercept + slope * i as f64))
            .collect();
        let m = mean(&residuals);
        let variance: f64 = residuals.iter().map(|r| (r - m).powi(2)).sum();
        if variance <= f64::EPSILON {
            return None;
        }

        let mut best: Option<Seasonality> = None;
        for lag in 2..=n / 2 {
            let covariance: f64 = (0..n - lag)
                .map(|i| (residuals[i] - m) * (residuals[i + lag] - m))
                .sum();
            let strength = covariance / variance;
            if strength > self.config.seasonality_threshold
                && best.as_ref().map_or(true, |b| strength > b.strength)
            {
                best = Some(Seasonality { period: lag, strength });
            }
        }
        best
    }
}

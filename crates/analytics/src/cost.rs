//! Resource cost analysis and budget forecasting.

use crate::stats::linear_fit;
use agentune_core::Time;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unit prices of provisioned resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Price per cpu core-hour
    pub cpu_core_hour: f64,
    /// Price per GB-hour of memory
    pub memory_gb_hour: f64,
    /// Price per GPU-hour
    pub gpu_hour: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            cpu_core_hour: 0.048,
            memory_gb_hour: 0.006,
            gpu_hour: 0.9,
        }
    }
}

/// Provisioned capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provisioned {
    /// Cpu cores
    pub cpu_cores: u32,
    /// Memory in GB
    pub memory_gb: u32,
    /// GPUs
    pub gpus: u32,
}

impl Default for Provisioned {
    fn default() -> Self {
        Self {
            cpu_cores: 4,
            memory_gb: 8,
            gpus: 1,
        }
    }
}

/// Observed usage over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Cpu utilization (0-1)
    pub cpu_utilization: f64,
    /// Memory in use, GB
    pub memory_gb: f64,
    /// GPU utilization (0-1)
    pub gpu_utilization: f64,
    /// Capacity the usage ran on
    pub provisioned: Provisioned,
}

impl ResourceUsage {
    /// Usage on the default provisioning.
    pub fn new(cpu_utilization: f64, memory_gb: f64, gpu_utilization: f64) -> Self {
        Self {
            cpu_utilization,
            memory_gb,
            gpu_utilization,
            provisioned: Provisioned::default(),
        }
    }
}

/// Billing period of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPeriod {
    /// One hour
    Hourly,
    /// One day
    Daily,
    /// Thirty days
    Monthly,
}

impl CostPeriod {
    /// Length in hours.
    pub fn hours(&self) -> f64 {
        match self {
            CostPeriod::Hourly => 1.0,
            CostPeriod::Daily => 24.0,
            CostPeriod::Monthly => 720.0,
        }
    }
}

/// Kind of cost recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostRecommendationKind {
    /// Shrink an under-used resource
    Rightsizing,
}

impl CostRecommendationKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CostRecommendationKind::Rightsizing => "rightsizing",
        }
    }
}

/// A cost-saving suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecommendation {
    /// Kind of recommendation
    pub kind: CostRecommendationKind,
    /// Resource name ("cpu", "memory", "gpu")
    pub resource: String,
    /// Currently provisioned units
    pub current: u32,
    /// Suggested units
    pub recommended: u32,
    /// Saving over the analyzed period
    pub savings: f64,
}

/// Result of a cost analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    /// Cost of the provisioned capacity over the period
    pub current_cost: f64,
    /// Cost after applying all recommendations
    pub optimized_cost: f64,
    /// Suggestions
    pub recommendations: Vec<CostRecommendation>,
}

/// One point of cost history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// When the analysis ran
    pub timestamp: Time,
    /// Cost normalized to one day
    pub daily_cost: f64,
}

/// Extrapolated spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetForecast {
    /// Days covered
    pub horizon_days: u32,
    /// Predicted cost per day
    pub daily_costs: Vec<f64>,
    /// Sum of `daily_costs`
    pub total_cost: f64,
    /// Confidence in the extrapolation (0-1)
    pub confidence: f64,
}

/// Cost analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Unit prices
    pub model: CostModel,
    /// Utilization below which a resource is rightsized
    pub low_utilization: f64,
    /// Utilization a rightsized resource should run at
    pub target_utilization: f64,
    /// Records kept for forecasting
    pub history_capacity: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            model: CostModel::default(),
            low_utilization: 0.3,
            target_utilization: 0.7,
            history_capacity: 365,
        }
    }
}

/// Cost analyzer with a rolling history of daily costs.
pub struct CostOptimizer {
    config: CostConfig,
    history: VecDeque<CostRecord>,
}

impl CostOptimizer {
    /// Create an optimizer with empty history.
    pub fn new(config: CostConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    fn cost(&self, p: &Provisioned, hours: f64) -> f64 {
        let m = &self.config.model;
        hours
            * (p.cpu_cores as f64 * m.cpu_core_hour
                + p.memory_gb as f64 * m.memory_gb_hour
                + p.gpus as f64 * m.gpu_hour)
    }

    /// Units needed to run `used` units at the target utilization.
    fn rightsize(&self, provisioned: u32, utilization: f64) -> Option<u32> {
        let utilization = if utilization.is_finite() { utilization.max(0.0) } else { return None };
        if provisioned == 0 || utilization >= self.config.low_utilization {
            return None;
        }
        let target = self.config.target_utilization.clamp(0.05, 1.0);
        let needed = ((provisioned as f64 * utilization / target).ceil() as u32).max(1);
        (needed < provisioned).then_some(needed)
    }

    /// Price usage over `period` and suggest rightsizing.
    ///
    /// The analysis is appended to the cost history.
    pub fn analyze_costs(&mut self, usage: &ResourceUsage, period: CostPeriod) -> CostAnalysis {
        let hours = period.hours();
        let current = &usage.provisioned;
        let memory_utilization = if current.memory_gb > 0 {
            usage.memory_gb / current.memory_gb as f64
        } else {
            0.0
        };

        let mut optimized = current.clone();
        let mut recommendations = Vec::new();
        let m = self.config.model.clone();
        let candidates = [
            ("cpu", current.cpu_cores, usage.cpu_utilization, m.cpu_core_hour),
            ("memory", current.memory_gb, memory_utilization, m.memory_gb_hour),
            ("gpu", current.gpus, usage.gpu_utilization, m.gpu_hour),
        ];
        for (resource, units, utilization, price) in candidates {
            if let Some(recommended) = self.rightsize(units, utilization) {
                match resource {
                    "cpu" => optimized.cpu_cores = recommended,
                    "memory" => optimized.memory_gb = recommended,
                    _ => optimized.gpus = recommended,
                }
                recommendations.push(CostRecommendation {
                    kind: CostRecommendationKind::Rightsizing,
                    resource: resource.to_string(),
                    current: units,
                    recommended,
                    savings: (units - recommended) as f64 * price * hours,
                });
            }
        }

        let current_cost = self.cost(current, hours);
        let optimized_cost = self.cost(&optimized, hours);

        self.history.push_back(CostRecord {
            timestamp: chrono::Utc::now(),
            daily_cost: current_cost / hours * 24.0,
        });
        while self.history.len() > self.config.history_capacity.max(1) {
            self.history.pop_front();
        }

        CostAnalysis {
            current_cost,
            optimized_cost,
            recommendations,
        }
    }

    /// Extrapolate daily cost for the next `horizon_days` days.
    ///
    /// Without history the forecast is zero with zero confidence.
    pub fn forecast_budget(&self, horizon_days: u32) -> BudgetForecast {
        let costs: Vec<f64> = self.history.iter().map(|r| r.daily_cost).collect();
        let Some(fit) = linear_fit(&costs) else {
            return BudgetForecast {
                horizon_days,
                daily_costs: vec![0.0; horizon_days as usize],
                total_cost: 0.0,
                confidence: 0.0,
            };
        };

        let n = costs.len() as f64;
        let daily_costs: Vec<f64> = (0..horizon_days)
            .map(|d| fit.at(n + d as f64).max(0.0))
            .collect();
        // A flat series fits perfectly even though r² is undefined.
        let fit_quality = if fit.slope == 0.0 && costs.len() > 1 { 1.0 } else { fit.r_squared };
        let confidence = (fit_quality * n / (n + 7.0)).clamp(0.0, 1.0);

        BudgetForecast {
            horizon_days,
            total_cost: daily_costs.iter().sum(),
            daily_costs,
            confidence,
        }
    }

    /// Recorded history, oldest first.
    pub fn history(&self) -> Vec<CostRecord> {
        self.history.iter().cloned().collect()
    }

    /// Replace history (used when restoring persisted state).
    pub fn restore_history(&mut self, records: Vec<CostRecord>) {
        let keep = self.config.history_capacity.max(1);
        let skip = records.len().saturating_sub(keep);
        self.history = records.into_iter().skip(skip).collect();
    }
}

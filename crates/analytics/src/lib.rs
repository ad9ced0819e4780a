//! Analytics layer - forecasting, bottleneck and anomaly detection, cost
//! analysis and trends.

#![warn(missing_docs)]

mod stats;

pub mod forecaster;
pub mod bottleneck;
pub mod cost;
pub mod anomaly;
pub mod trend;
pub mod engine;

pub use forecaster::{
    CompletionForecast, DataPoint, Forecast, ForecasterConfig, MetricForecast, SuccessForecast, TaskMeta,
    TimeSeriesForecaster, DURATION_METRIC, SUCCESS_METRIC,
};
pub use bottleneck::{
    AgentMetrics, Bottleneck, BottleneckDetector, BottleneckKind, BottleneckReport, BottleneckStats,
    BottleneckThresholds, Recommendation, RecommendationAction, SystemMetrics,
};
pub use cost::{
    BudgetForecast, CostAnalysis, CostConfig, CostModel, CostOptimizer, CostPeriod, CostRecommendation,
    CostRecommendationKind, CostRecord, Provisioned, ResourceUsage,
};
pub use anomaly::{AnomalyConfig, AnomalyDetector, AnomalyScore};
pub use trend::{MetricTrend, Seasonality, TrendAnalyzer, TrendConfig, TrendDirection, TrendReport};
pub use engine::{
    AnalyticsConfig, HealthReport, PredictionContext, PredictiveAnalyticsEngine, WorkflowPrediction,
    COST_HISTORY_KEY,
};

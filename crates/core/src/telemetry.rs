//! Live performance telemetry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named metric values of a single sample.
pub type Metrics = BTreeMap<String, f64>;

/// Aggregate statistics reported by the orchestrator's performance monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceStats {
    /// Average response time (milliseconds)
    pub avg_response_time: f64,
    /// Requests served so far
    pub total_requests: u64,
    /// Memory utilization (0-1)
    pub memory_utilization: f64,
    /// CPU usage (0-1)
    pub cpu_usage: f64,
}

impl PerformanceStats {
    /// Flatten into a metric sample.
    pub fn to_metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("avg_response_time".to_string(), self.avg_response_time);
        metrics.insert("total_requests".to_string(), self.total_requests as f64);
        metrics.insert("memory_utilization".to_string(), self.memory_utilization);
        metrics.insert("cpu_usage".to_string(), self.cpu_usage);
        metrics
    }
}

/// Read-only source of live performance statistics.
#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    /// Current statistics.
    async fn get_stats(&self) -> PerformanceStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMonitor(PerformanceStats);

    #[async_trait]
    impl PerformanceMonitor for FixedMonitor {
        async fn get_stats(&self) -> PerformanceStats {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_monitor_is_object_safe() {
        let monitor: Box<dyn PerformanceMonitor> = Box::new(FixedMonitor(PerformanceStats {
            avg_response_time: 120.0,
            total_requests: 10,
            memory_utilization: 0.5,
            cpu_usage: 0.4,
        }));
        let stats = monitor.get_stats().await;
        assert_eq!(stats.total_requests, 10);

        let metrics = stats.to_metrics();
        assert_eq!(metrics["avg_response_time"], 120.0);
        assert_eq!(metrics.len(), 4);
    }
}

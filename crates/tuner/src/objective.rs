//! Scoring live performance statistics.

use agentune_core::PerformanceStats;
use serde::{Deserialize, Serialize};

/// Weights of the tuning objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    /// Weight of response time
    pub response_time: f64,
    /// Weight of memory headroom
    pub memory: f64,
    /// Weight of CPU headroom
    pub cpu: f64,
    /// Response time (ms) that scores 0.5
    pub response_time_scale_ms: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            response_time: 0.5,
            memory: 0.25,
            cpu: 0.25,
            response_time_scale_ms: 1000.0,
        }
    }
}

/// Score `stats` in `[0, 1]`; higher is better.
///
/// Response time maps through `scale / (scale + t)`, memory and CPU
/// through their headroom `1 - utilization`.
pub fn score_stats(stats: &PerformanceStats, weights: &ObjectiveWeights) -> f64 {
    let scale = if weights.response_time_scale_ms > 0.0 {
        weights.response_time_scale_ms
    } else {
        1.0
    };
    let latency = finite_or(stats.avg_response_time, f64::INFINITY).max(0.0);
    let latency_score = if latency.is_finite() { scale / (scale + latency) } else { 0.0 };
    let memory_score = 1.0 - finite_or(stats.memory_utilization, 1.0).clamp(0.0, 1.0);
    let cpu_score = 1.0 - finite_or(stats.cpu_usage, 1.0).clamp(0.0, 1.0);

    let w = [weights.response_time, weights.memory, weights.cpu].map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
    let total: f64 = w.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    ((w[0] * latency_score + w[1] * memory_score + w[2] * cpu_score) / total).clamp(0.0, 1.0)
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(rt: f64, mem: f64, cpu: f64) -> PerformanceStats {
        PerformanceStats {
            avg_response_time: rt,
            total_requests: 100,
            memory_utilization: mem,
            cpu_usage: cpu,
        }
    }

    #[test]
    fn test_faster_and_lighter_scores_higher() {
        let w = ObjectiveWeights::default();
        let slow = score_stats(&stats(2000.0, 0.8, 0.8), &w);
        let fast = score_stats(&stats(200.0, 0.8, 0.8), &w);
        let light = score_stats(&stats(200.0, 0.3, 0.3), &w);
        assert!(fast > slow);
        assert!(light > fast);
    }

    #[test]
    fn test_bounds() {
        let w = ObjectiveWeights::default();
        assert!((score_stats(&stats(0.0, 0.0, 0.0), &w) - 1.0).abs() < 1e-12);
        assert_eq!(score_stats(&stats(f64::NAN, 2.0, f64::INFINITY), &w), 0.0);
        assert!((score_stats(&stats(1000.0, 1.0, 1.0), &w) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights() {
        let w = ObjectiveWeights {
            response_time: 0.0,
            memory: 0.0,
            cpu: 0.0,
            ..Default::default()
        };
        assert_eq!(score_stats(&stats(10.0, 0.1, 0.1), &w), 0.0);
    }
}

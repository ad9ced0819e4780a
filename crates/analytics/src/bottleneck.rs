//! Bottleneck detection and remediation suggestions.
//!
//! Compares per-agent and system-wide load against thresholds:
//! - agent capacity (utilization, queue length, response time)
//! - resource limits (cpu, memory)
//! - recommendations for scaling or rebalancing

use serde::{Deserialize, Serialize};

/// Limits above which something counts as a bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckThresholds {
    /// Agent utilization (0-1)
    pub agent_utilization: f64,
    /// Queued tasks per agent
    pub queue_length: usize,
    /// Agent response time in milliseconds
    pub response_time_ms: f64,
    /// System cpu utilization (0-1)
    pub cpu: f64,
    /// System memory utilization (0-1)
    pub memory: f64,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            agent_utilization: 0.8,
            queue_length: 10,
            response_time_ms: 5000.0,
            cpu: 0.85,
            memory: 0.9,
        }
    }
}

/// Load of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Agent id
    pub id: String,
    /// Utilization (0-1)
    pub utilization: f64,
    /// Queued tasks
    pub queue_length: usize,
    /// Average response time in milliseconds
    pub avg_response_time_ms: f64,
}

/// Snapshot of the whole system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    /// Per-agent load
    pub agents: Vec<AgentMetrics>,
    /// System cpu utilization (0-1)
    pub cpu: f64,
    /// System memory utilization (0-1)
    pub memory: f64,
}

/// What is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    /// An agent is over capacity
    AgentCapacity,
    /// A system resource is near its limit
    ResourceLimit,
}

/// A detected bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    /// Kind of bottleneck
    pub kind: BottleneckKind,
    /// Agent id or resource name
    pub target: String,
    /// Fraction by which the worst threshold is exceeded, capped at 1
    pub severity: f64,
    /// Human-readable reason
    pub reason: String,
}

/// Remediation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    /// Add agents to the pool
    ScaleAgents,
    /// Move work off a single overloaded agent
    RebalanceLoad,
    /// Provision more of a resource
    IncreaseCapacity,
}

impl RecommendationAction {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationAction::ScaleAgents => "scale_agents",
            RecommendationAction::RebalanceLoad => "rebalance_load",
            RecommendationAction::IncreaseCapacity => "increase_capacity",
        }
    }
}

/// Suggested remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Action to take
    pub action: RecommendationAction,
    /// Agent id, resource name or "agent_pool"
    pub target: String,
}

/// Detection statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckStats {
    /// Agents inspected
    pub agents_checked: usize,
    /// Agents over capacity
    pub overloaded_agents: usize,
    /// Resources near their limit
    pub resource_limits: usize,
    /// Highest severity found
    pub max_severity: f64,
}

/// Result of bottleneck detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    /// All detected bottlenecks
    pub bottlenecks: Vec<Bottleneck>,
    /// Suggested remediations
    pub recommendations: Vec<Recommendation>,
    /// Statistics
    pub stats: BottleneckStats,
}

/// Threshold-based bottleneck detector.
#[derive(Debug, Clone, Default)]
pub struct BottleneckDetector {
    thresholds: BottleneckThresholds,
}

impl BottleneckDetector {
    /// Create a detector.
    pub fn new(thresholds: BottleneckThresholds) -> Self {
        Self { thresholds }
    }

    /// Detect bottlenecks in a system snapshot.
    pub fn detect_bottlenecks(&self, metrics: &SystemMetrics) -> BottleneckReport {
        let t = &self.thresholds;
        let mut bottlenecks = Vec::new();

        // Agent capacity
        for agent in &metrics.agents {
            let ratios = [
                ("utilization", ratio(agent.utilization, t.agent_utilization)),
                ("queue length", ratio(agent.queue_length as f64, t.queue_length as f64)),
                ("response time", ratio(agent.avg_response_time_ms, t.response_time_ms)),
            ];
            let exceeded: Vec<&str> = ratios.iter().filter(|(_, r)| *r > 1.0).map(|(n, _)| *n).collect();
            if exceeded.is_empty() {
                continue;
            }
            let worst = ratios.iter().map(|(_, r)| *r).fold(0.0, f64::max);
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::AgentCapacity,
                target: agent.id.clone(),
                severity: (worst - 1.0).clamp(0.0, 1.0),
                reason: format!("{} over threshold", exceeded.join(", ")),
            });
        }
        let overloaded: Vec<String> = bottlenecks.iter().map(|b| b.target.clone()).collect();

        // Resource limits
        for (resource, value, limit) in [("cpu", metrics.cpu, t.cpu), ("memory", metrics.memory, t.memory)] {
            let r = ratio(value, limit);
            if r > 1.0 {
                bottlenecks.push(Bottleneck {
                    kind: BottleneckKind::ResourceLimit,
                    target: resource.to_string(),
                    severity: (r - 1.0).clamp(0.0, 1.0),
                    reason: format!("{} at {:.0}% (limit {:.0}%)", resource, value * 100.0, limit * 100.0),
                });
            }
        }

        let recommendations = self.recommend(&overloaded, &bottlenecks);
        let stats = BottleneckStats {
            agents_checked: metrics.agents.len(),
            overloaded_agents: overloaded.len(),
            resource_limits: bottlenecks.len() - overloaded.len(),
            max_severity: bottlenecks.iter().map(|b| b.severity).fold(0.0, f64::max),
        };

        BottleneckReport {
            bottlenecks,
            recommendations,
            stats,
        }
    }

    fn recommend(&self, overloaded: &[String], bottlenecks: &[Bottleneck]) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        match overloaded {
            [] => {}
            [single] => recommendations.push(Recommendation {
                action: RecommendationAction::RebalanceLoad,
                target: single.clone(),
            }),
            _ => recommendations.push(Recommendation {
                action: RecommendationAction::ScaleAgents,
                target: "agent_pool".to_string(),
            }),
        }

        for b in bottlenecks.iter().filter(|b| b.kind == BottleneckKind::ResourceLimit) {
            recommendations.push(Recommendation {
                action: RecommendationAction::IncreaseCapacity,
                target: b.target.clone(),
            });
        }
        recommendations
    }
}

/// `value / limit`, treating non-finite values as within limits.
fn ratio(value: f64, limit: f64) -> f64 {
    if !value.is_finite() || limit <= 0.0 {
        0.0
    } else {
        value / limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, utilization: f64, queue: usize, rt: f64) -> AgentMetrics {
        AgentMetrics {
            id: id.to_string(),
            utilization,
            queue_length: queue,
            avg_response_time_ms: rt,
        }
    }

    #[test]
    fn test_healthy_system() {
        let detector = BottleneckDetector::default();
        let report = detector.detect_bottlenecks(&SystemMetrics {
            agents: vec![agent("a", 0.5, 2, 100.0)],
            cpu: 0.4,
            memory: 0.5,
        });
        assert!(report.bottlenecks.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.stats.agents_checked, 1);
    }

    #[test]
    fn test_multiple_overloaded_agents_scale() {
        let detector = BottleneckDetector::default();
        let report = detector.detect_bottlenecks(&SystemMetrics {
            agents: vec![
                agent("a", 0.95, 2, 100.0),
                agent("b", 0.5, 25, 100.0),
                agent("c", 0.3, 0, 50.0),
            ],
            cpu: 0.5,
            memory: 0.5,
        });
        assert_eq!(report.stats.overloaded_agents, 2);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].action.as_str(), "scale_agents");
        assert!(report.bottlenecks.iter().all(|b| b.kind == BottleneckKind::AgentCapacity));
        assert!((report.stats.max_severity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_overloaded_agent_rebalances() {
        let detector = BottleneckDetector::default();
        let report = detector.detect_bottlenecks(&SystemMetrics {
            agents: vec![agent("a", 0.2, 0, 6000.0), agent("b", 0.2, 0, 100.0)],
            cpu: 0.95,
            memory: 0.5,
        });
        let actions: Vec<_> = report.recommendations.iter().map(|r| (r.action, r.target.as_str())).collect();
        assert_eq!(
            actions,
            vec![
                (RecommendationAction::RebalanceLoad, "a"),
                (RecommendationAction::IncreaseCapacity, "cpu"),
            ]
        );
        assert_eq!(report.stats.resource_limits, 1);
        assert!((report.bottlenecks[0].severity - 0.2).abs() < 1e-9);
    }
}

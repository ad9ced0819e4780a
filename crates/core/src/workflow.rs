//! Workflow snapshots, discretized states and learning experiences.

use crate::{AgentuneError, Result};
use serde::{Deserialize, Serialize};

/// Names of the entries of [`WorkflowState::features`], in order.
pub const FEATURE_NAMES: [&str; 6] = [
    "complexity",
    "agent_load",
    "cpu",
    "memory",
    "duration_pressure",
    "success_rate",
];

/// Seconds at which the duration pressure feature reaches 0.5.
const DURATION_SCALE_SECS: f64 = 300.0;

/// Buckets used when discretizing complexity.
const COMPLEXITY_BUCKETS: usize = 10;

/// Buckets used when discretizing load, cpu and memory.
const LEVEL_BUCKETS: usize = 5;

/// Raw workflow descriptor handed over by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowData {
    /// Estimated complexity on a 0-100 scale
    pub complexity: f64,

    /// Kind of task (e.g. "analysis", "codegen")
    pub task_type: String,

    /// Current load of the agent pool (0-1)
    pub agent_load: f64,

    /// CPU utilization (0-1)
    pub cpu: f64,

    /// Memory utilization (0-1)
    pub memory: f64,

    /// Durations of previous runs in seconds
    pub duration_history: Vec<f64>,

    /// Historical success rate (0-1)
    pub success_rate: f64,
}

impl Default for WorkflowData {
    fn default() -> Self {
        Self {
            complexity: 0.0,
            task_type: "general".to_string(),
            agent_load: 0.0,
            cpu: 0.0,
            memory: 0.0,
            duration_history: Vec::new(),
            success_rate: 0.5,
        }
    }
}

impl WorkflowData {
    /// Create a descriptor for the given task type.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Default::default()
        }
    }

    /// Set complexity.
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    /// Set agent load.
    pub fn with_agent_load(mut self, load: f64) -> Self {
        self.agent_load = load;
        self
    }

    /// Set resource utilization.
    pub fn with_resources(mut self, cpu: f64, memory: f64) -> Self {
        self.cpu = cpu;
        self.memory = memory;
        self
    }

    /// Set historical success rate.
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate;
        self
    }

    /// Set historical durations.
    pub fn with_durations(mut self, durations: Vec<f64>) -> Self {
        self.duration_history = durations;
        self
    }
}

/// Immutable, sanitized snapshot of a workflow used for prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    complexity: f64,
    task_type: String,
    agent_load: f64,
    cpu: f64,
    memory: f64,
    duration_history: Vec<f64>,
    success_rate: f64,
}

impl From<&WorkflowData> for WorkflowState {
    fn from(data: &WorkflowData) -> Self {
        Self {
            complexity: sanitize(data.complexity, 100.0),
            task_type: data.task_type.clone(),
            agent_load: sanitize(data.agent_load, 1.0),
            cpu: sanitize(data.cpu, 1.0),
            memory: sanitize(data.memory, 1.0),
            duration_history: data
                .duration_history
                .iter()
                .copied()
                .filter(|d| d.is_finite() && *d >= 0.0)
                .collect(),
            success_rate: sanitize(data.success_rate, 1.0),
        }
    }
}

impl From<WorkflowData> for WorkflowState {
    fn from(data: WorkflowData) -> Self {
        Self::from(&data)
    }
}

fn sanitize(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

fn bucket(value: f64, buckets: usize) -> usize {
    ((value * buckets as f64).floor() as usize).min(buckets - 1)
}

impl WorkflowState {
    /// Complexity on a 0-100 scale.
    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    /// Task type.
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Agent pool load.
    pub fn agent_load(&self) -> f64 {
        self.agent_load
    }

    /// CPU utilization.
    pub fn cpu(&self) -> f64 {
        self.cpu
    }

    /// Memory utilization.
    pub fn memory(&self) -> f64 {
        self.memory
    }

    /// Historical success rate.
    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Mean historical duration, if any history exists.
    pub fn mean_duration(&self) -> Option<f64> {
        if self.duration_history.is_empty() {
            None
        } else {
            Some(self.duration_history.iter().sum::<f64>() / self.duration_history.len() as f64)
        }
    }

    /// Numeric feature vector, ordered as [`FEATURE_NAMES`], each in [0, 1].
    pub fn features(&self) -> Vec<f64> {
        let duration = self.mean_duration().unwrap_or(0.0);
        vec![
            self.complexity / 100.0,
            self.agent_load,
            self.cpu,
            self.memory,
            duration / (duration + DURATION_SCALE_SECS),
            self.success_rate,
        ]
    }

    /// Rebuild a state from a feature vector (inverse of [`features`](Self::features)).
    ///
    /// Missing trailing features keep their defaults.
    pub fn from_features(features: &[f64], task_type: &str) -> Self {
        let get = |i: usize, default: f64| features.get(i).copied().unwrap_or(default);
        let pressure = get(4, 0.0).clamp(0.0, 0.999);
        let duration = pressure * DURATION_SCALE_SECS / (1.0 - pressure);
        let data = WorkflowData {
            complexity: get(0, 0.0) * 100.0,
            task_type: task_type.to_string(),
            agent_load: get(1, 0.0),
            cpu: get(2, 0.0),
            memory: get(3, 0.0),
            duration_history: if duration > 0.0 { vec![duration] } else { Vec::new() },
            success_rate: get(5, 0.5),
        };
        Self::from(&data)
    }

    /// Discretized key used by the Q-table.
    pub fn key(&self) -> StateKey {
        StateKey(format!(
            "c{}|{}|l{}|p{}|m{}",
            bucket(self.complexity / 100.0, COMPLEXITY_BUCKETS),
            self.task_type,
            bucket(self.agent_load, LEVEL_BUCKETS),
            bucket(self.cpu, LEVEL_BUCKETS),
            bucket(self.memory, LEVEL_BUCKETS),
        ))
    }
}

/// Discretized state identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey(pub String);

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (state, action) outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// State the action was taken in
    pub state: WorkflowState,
    /// Chosen action (agent id)
    pub action: String,
    /// Observed reward
    pub reward: f64,
    /// Resulting state
    pub next_state: WorkflowState,
    /// Whether the episode ended
    pub done: bool,
}

impl Experience {
    /// Create a new experience.
    pub fn new(
        state: WorkflowState,
        action: impl Into<String>,
        reward: f64,
        next_state: WorkflowState,
        done: bool,
    ) -> Self {
        Self {
            state,
            action: action.into(),
            reward,
            next_state,
            done,
        }
    }
}

/// A recorded sequence of decisions used for offline training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Visited states; either one per action or one extra terminal state
    pub states: Vec<WorkflowState>,
    /// Actions taken
    pub actions: Vec<String>,
    /// Rewards received, one per action
    pub rewards: Vec<f64>,
}

impl Episode {
    /// Split the episode into experiences, in order.
    ///
    /// The next state of step `i` is `states[i + 1]`, or `states[i]` when the
    /// episode carries no terminal state. Only the last step is `done`.
    pub fn experiences(&self) -> Result<Vec<Experience>> {
        let steps = self.actions.len();
        if self.rewards.len() != steps {
            return Err(AgentuneError::InvalidInput(format!(
                "episode has {} actions but {} rewards",
                steps,
                self.rewards.len()
            )));
        }
        if self.states.len() != steps && self.states.len() != steps + 1 {
            return Err(AgentuneError::InvalidInput(format!(
                "episode has {} actions but {} states",
                steps,
                self.states.len()
            )));
        }

        Ok((0..steps)
            .map(|i| {
                let next = self.states.get(i + 1).unwrap_or(&self.states[i]);
                Experience::new(
                    self.states[i].clone(),
                    self.actions[i].clone(),
                    self.rewards[i],
                    next.clone(),
                    i + 1 == steps,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_sanitizes_input() {
        let data = WorkflowData::new("analysis")
            .with_complexity(250.0)
            .with_agent_load(-1.0)
            .with_resources(f64::NAN, 0.4);
        let state = WorkflowState::from(&data);
        assert_eq!(state.complexity(), 100.0);
        assert_eq!(state.agent_load(), 0.0);
        assert_eq!(state.cpu(), 0.0);
        assert_eq!(state.memory(), 0.4);
    }

    #[test]
    fn test_state_key_buckets() {
        let a = WorkflowState::from(WorkflowData::new("analysis").with_complexity(50.0).with_agent_load(0.5));
        let b = WorkflowState::from(WorkflowData::new("analysis").with_complexity(55.0).with_agent_load(0.55));
        let c = WorkflowState::from(WorkflowData::new("codegen").with_complexity(50.0).with_agent_load(0.5));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().0, "c5|analysis|l2|p0|m0");
    }

    #[test]
    fn test_full_scale_values_land_in_last_bucket() {
        let state = WorkflowState::from(WorkflowData::new("x").with_complexity(100.0).with_agent_load(1.0));
        assert_eq!(state.key().0, "c9|x|l4|p0|m0");
    }

    #[test]
    fn test_features_roundtrip_through_state() {
        let data = WorkflowData::new("analysis")
            .with_complexity(40.0)
            .with_agent_load(0.3)
            .with_resources(0.6, 0.7)
            .with_durations(vec![100.0, 200.0])
            .with_success_rate(0.9);
        let state = WorkflowState::from(&data);
        let features = state.features();
        assert_eq!(features.len(), FEATURE_NAMES.len());

        let rebuilt = WorkflowState::from_features(&features, "analysis");
        assert_eq!(rebuilt.key(), state.key());
        assert!((rebuilt.mean_duration().unwrap() - 150.0).abs() < 1e-6);
        assert!((rebuilt.success_rate() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_episode_experiences() {
        let s = |c: f64| WorkflowState::from(WorkflowData::new("t").with_complexity(c));
        let episode = Episode {
            states: vec![s(10.0), s(20.0), s(30.0)],
            actions: vec!["a".into(), "b".into()],
            rewards: vec![0.5, 1.0],
        };
        let exps = episode.experiences().unwrap();
        assert_eq!(exps.len(), 2);
        assert_eq!(exps[0].next_state, s(20.0));
        assert!(!exps[0].done);
        assert_eq!(exps[1].next_state, s(30.0));
        assert!(exps[1].done);
    }

    #[test]
    fn test_episode_without_terminal_state() {
        let s = WorkflowState::from(WorkflowData::new("t"));
        let episode = Episode {
            states: vec![s.clone()],
            actions: vec!["a".into()],
            rewards: vec![1.0],
        };
        let exps = episode.experiences().unwrap();
        assert_eq!(exps[0].next_state, s);
        assert!(exps[0].done);
    }

    #[test]
    fn test_malformed_episode_is_rejected() {
        let episode = Episode {
            states: vec![],
            actions: vec!["a".into()],
            rewards: vec![1.0],
        };
        assert!(matches!(episode.experiences(), Err(AgentuneError::InvalidInput(_))));

        let episode = Episode {
            states: vec![WorkflowState::from(WorkflowData::default())],
            actions: vec!["a".into()],
            rewards: vec![],
        };
        assert!(episode.experiences().is_err());
    }
}

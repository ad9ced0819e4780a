//! Tabular Q-learning for agent selection.

use agentune_core::{seeded_rng, AgentuneError, Experience, Result, StateKey, WorkflowState};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Hyper-parameters of the Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    /// Step size α
    pub learning_rate: f64,
    /// Discount γ
    pub discount_factor: f64,
    /// Initial ε for ε-greedy selection
    pub exploration_rate: f64,
    /// Multiplicative ε decay applied after every update
    pub exploration_decay: f64,
    /// Lower bound for ε
    pub min_exploration: f64,
    /// Replay buffer capacity
    pub replay_capacity: usize,
    /// Seed for exploration and replay sampling
    pub seed: Option<u64>,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            exploration_rate: 0.1,
            exploration_decay: 0.995,
            min_exploration: 0.01,
            replay_capacity: 10_000,
            seed: None,
        }
    }
}

/// Value estimates per discretized state and action.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: HashMap<StateKey, HashMap<String, f64>>,
}

impl QTable {
    /// Value of `action` in `state`; unseen pairs are worth 0.
    pub fn value(&self, state: &StateKey, action: &str) -> f64 {
        self.values
            .get(state)
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Highest known value in `state`.
    pub fn max_value(&self, state: &StateKey) -> Option<f64> {
        self.values
            .get(state)
            .and_then(|actions| actions.values().copied().reduce(f64::max))
    }

    fn set(&mut self, state: StateKey, action: &str, value: f64) {
        self.values
            .entry(state)
            .or_default()
            .insert(action.to_string(), value);
    }

    /// Number of states with at least one value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One persisted Q-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    /// Discretized state
    pub state: StateKey,
    /// Action
    pub action: String,
    /// Value estimate
    pub value: f64,
}

/// Persistable learning state (the replay buffer is not persisted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningSnapshot {
    /// Q-table entries
    pub entries: Vec<QEntry>,
    /// Current ε
    pub exploration_rate: f64,
    /// Updates applied so far
    pub total_steps: u64,
}

fn unit_rate(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// ε-greedy tabular Q-learning agent.
pub struct QLearningAgent {
    config: QLearningConfig,
    table: QTable,
    replay: VecDeque<Experience>,
    exploration_rate: f64,
    total_steps: u64,
    rng: StdRng,
}

impl QLearningAgent {
    /// Create a new agent. Out-of-range rates are clamped into `[0, 1]`,
    /// NaN rates take their defaults, and the initial ε is raised to at
    /// least `min_exploration`.
    pub fn new(config: QLearningConfig) -> Self {
        let mut config = config;
        let defaults = QLearningConfig::default();
        config.learning_rate = unit_rate(config.learning_rate, defaults.learning_rate);
        config.discount_factor = unit_rate(config.discount_factor, defaults.discount_factor);
        config.exploration_rate = unit_rate(config.exploration_rate, defaults.exploration_rate);
        config.exploration_decay = unit_rate(config.exploration_decay, defaults.exploration_decay);
        config.min_exploration = unit_rate(config.min_exploration, defaults.min_exploration);
        config.replay_capacity = config.replay_capacity.max(1);
        let exploration_rate = config.exploration_rate.clamp(config.min_exploration, 1.0);

        Self {
            rng: seeded_rng(config.seed),
            table: QTable::default(),
            replay: VecDeque::new(),
            exploration_rate,
            total_steps: 0,
            config,
        }
    }

    /// Choose an action: uniformly at random with probability ε, otherwise
    /// the highest-valued one (ties go to the earliest in `actions`).
    pub fn select_action(&mut self, state: &WorkflowState, actions: &[String]) -> Result<String> {
        if actions.is_empty() {
            return Err(AgentuneError::EmptyCandidates);
        }

        if self.rng.gen::<f64>() < self.exploration_rate {
            let idx = self.rng.gen_range(0..actions.len());
            return Ok(actions[idx].clone());
        }

        self.best_action(state, actions)
            .map(|(action, _)| action)
            .ok_or(AgentuneError::EmptyCandidates)
    }

    /// Greedy choice without exploration.
    pub fn best_action(&self, state: &WorkflowState, actions: &[String]) -> Option<(String, f64)> {
        let key = state.key();
        let mut best: Option<(&String, f64)> = None;
        for action in actions {
            let value = self.table.value(&key, action);
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((action, value)),
            }
        }
        best.map(|(a, v)| (a.clone(), v))
    }

    /// Apply one temporal-difference update and record the experience.
    ///
    /// Returns the TD error.
    pub fn update(&mut self, experience: Experience) -> f64 {
        let td_error = self.apply(&experience);

        self.replay.push_back(experience);
        while self.replay.len() > self.config.replay_capacity {
            self.replay.pop_front();
        }

        self.total_steps += 1;
        self.exploration_rate =
            (self.exploration_rate * self.config.exploration_decay).max(self.config.min_exploration);

        td_error
    }

    /// Re-apply the update rule to `batch_size` experiences sampled from
    /// the replay buffer. Step count and ε are left unchanged.
    pub fn replay(&mut self, batch_size: usize) -> usize {
        if self.replay.is_empty() {
            return 0;
        }
        let batch: Vec<Experience> = (0..batch_size)
            .map(|_| self.replay[self.rng.gen_range(0..self.replay.len())].clone())
            .collect();
        for experience in &batch {
            self.apply(experience);
        }
        batch.len()
    }

    fn apply(&mut self, experience: &Experience) -> f64 {
        let key = experience.state.key();
        let current = self.table.value(&key, &experience.action);
        let future = if experience.done {
            0.0
        } else {
            self.table.max_value(&experience.next_state.key()).unwrap_or(0.0)
        };

        let target = experience.reward + self.config.discount_factor * future;
        let td_error = target - current;
        self.table
            .set(key, &experience.action, current + self.config.learning_rate * td_error);
        td_error
    }

    /// Value estimate of `action` in `state`.
    pub fn q_value(&self, state: &WorkflowState, action: &str) -> f64 {
        self.table.value(&state.key(), action)
    }

    /// The Q-table.
    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Current ε.
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Updates applied so far.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Experiences currently buffered.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Capture learned state for persistence.
    pub fn snapshot(&self) -> QLearningSnapshot {
        let mut entries: Vec<QEntry> = self
            .table
            .values
            .iter()
            .flat_map(|(state, actions)| {
                actions.iter().map(move |(action, value)| QEntry {
                    state: state.clone(),
                    action: action.clone(),
                    value: *value,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.state.cmp(&b.state).then_with(|| a.action.cmp(&b.action)));

        QLearningSnapshot {
            entries,
            exploration_rate: self.exploration_rate,
            total_steps: self.total_steps,
        }
    }

    /// Replace learned state with a snapshot.
    ///
    /// ε is taken from the snapshot only if that does not raise it, keeping
    /// exploration non-increasing.
    pub fn restore(&mut self, snapshot: QLearningSnapshot) {
        let mut table = QTable::default();
        for entry in snapshot.entries {
            table.set(entry.state, &entry.action, entry.value);
        }
        self.table = table;
        self.total_steps = snapshot.total_steps;
        self.exploration_rate = snapshot
            .exploration_rate
            .clamp(self.config.min_exploration, self.exploration_rate);
    }
}

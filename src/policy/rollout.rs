use super::ACTION_DIM;

/// One on-policy transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f32>,
    pub raw_action: [f32; ACTION_DIM],
    pub log_prob: f32,
    pub value: f32,
    pub reward: f32,
    /// Episode ended with this transition.
    pub done: bool,
}

/// Fixed-length storage for one PPO rollout.
///
/// Filled with [`push`](Self::push) until [`is_full`](Self::is_full), then
/// [`finish`](Self::finish) computes advantages and returns, the learner
/// reads it, and [`clear`](Self::clear) starts the next one.
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    capacity: usize,
    observation_dim: usize,
    observations: Vec<f32>,
    raw_actions: Vec<f32>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new(capacity: usize, observation_dim: usize) -> Self {
        RolloutBuffer {
            capacity,
            observation_dim,
            observations: Vec::with_capacity(capacity * observation_dim),
            raw_actions: Vec::with_capacity(capacity * ACTION_DIM),
            log_probs: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn push(&mut self, transition: Transition) {
        debug_assert!(!self.is_full(), "rollout buffer overflow");
        debug_assert_eq!(transition.observation.len(), self.observation_dim);
        self.observations.extend_from_slice(&transition.observation);
        self.raw_actions.extend_from_slice(&transition.raw_action);
        self.log_probs.push(transition.log_prob);
        self.values.push(transition.value);
        self.rewards.push(transition.reward);
        self.dones.push(transition.done);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    /// Compute advantages and returns, bootstrapping from `last_value`.
    pub fn finish(&mut self, last_value: f32, gamma: f32, gae_lambda: f32) {
        let (advantages, returns) = compute_gae(
            &self.rewards,
            &self.values,
            &self.dones,
            last_value,
            gamma,
            gae_lambda,
        );
        self.advantages = advantages;
        self.returns = returns;
    }

    /// True once [`finish`](Self::finish) ran on the current contents.
    pub fn is_finished(&self) -> bool {
        !self.is_empty() && self.advantages.len() == self.len()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.raw_actions.clear();
        self.log_probs.clear();
        self.values.clear();
        self.rewards.clear();
        self.dones.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    pub fn observation(&self, index: usize) -> &[f32] {
        let start = index * self.observation_dim;
        &self.observations[start..start + self.observation_dim]
    }

    pub fn raw_action(&self, index: usize) -> &[f32] {
        &self.raw_actions[index * ACTION_DIM..(index + 1) * ACTION_DIM]
    }

    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn advantages(&self) -> &[f32] {
        &self.advantages
    }

    pub fn returns(&self) -> &[f32] {
        &self.returns
    }
}

/// Generalized Advantage Estimation over a single trajectory segment.
///
/// `dones[t]` marks that the episode ended after step `t`; the value chain is
/// cut there. `last_value` bootstraps the step after the segment.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(dones.len(), n);

    let mut advantages = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    // Process backwards
    let mut gae = 0.0f32;
    let mut next_value = last_value;
    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * gae_lambda * not_done * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    (advantages, returns)
}

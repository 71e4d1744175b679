use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of a single training episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    pub reward: f64,
    pub length: u64,
}

/// Training metrics tracker with rolling window computations.
pub struct TrainingMetrics {
    episodes: VecDeque<EpisodeStats>,
    update_losses: VecDeque<f32>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
    window_start: Instant,
    window_steps: u64,
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            episodes: VecDeque::with_capacity(capacity),
            update_losses: VecDeque::with_capacity(capacity),
            capacity,
            total_episodes: 0,
            window_start: Instant::now(),
            window_steps: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_step(&mut self) {
        self.window_steps += 1;
    }

    pub fn record_episode(&mut self, stats: EpisodeStats) {
        self.total_episodes += 1;
        self.episodes.push_back(stats);
        if self.episodes.len() > self.capacity {
            self.episodes.pop_front();
        }
    }

    pub fn record_update(&mut self, loss: f32) {
        self.update_losses.push_back(loss);
        if self.update_losses.len() > self.capacity {
            self.update_losses.pop_front();
        }
    }

    /// Mean episode return over the last N episodes.
    pub fn average_reward(&self, last_n: usize) -> f64 {
        let n = self.episodes.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self.episodes.iter().rev().take(n).map(|e| e.reward).sum();
        sum / n as f64
    }

    /// Mean episode length over the last N episodes.
    pub fn average_length(&self, last_n: usize) -> f64 {
        let n = self.episodes.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let total: u64 = self.episodes.iter().rev().take(n).map(|e| e.length).sum();
        total as f64 / n as f64
    }

    /// Average loss over the last N updates.
    pub fn average_loss(&self, last_n: usize) -> f32 {
        let n = self.update_losses.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let sum: f32 = self.update_losses.iter().rev().take(n).sum();
        sum / n as f32
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    /// Environment steps per second since the last `reset_window` call.
    pub fn steps_per_sec(&self) -> f64 {
        let elapsed = self.window_start.elapsed();
        if elapsed == Duration::ZERO {
            return 0.0;
        }
        self.window_steps as f64 / elapsed.as_secs_f64()
    }

    /// Reset the throughput window (call after each log line).
    pub fn reset_window(&mut self) {
        self.window_start = Instant::now();
        self.window_steps = 0;
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

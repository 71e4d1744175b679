use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{info_keys, StepInfo};
use crate::policy::Action;

/// Replaces the simulator's reward during training.
pub trait RewardShaper: Send + Sync {
    fn shape(&self, raw_reward: f64, info: &StepInfo, action: &Action, done: bool) -> f64;
}

impl<F> RewardShaper for F
where
    F: Fn(f64, &StepInfo, &Action, bool) -> f64 + Send + Sync,
{
    fn shape(&self, raw_reward: f64, info: &StepInfo, action: &Action, done: bool) -> f64 {
        self(raw_reward, info, action, done)
    }
}

/// Reward shaping selected in the `[training]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardShapingKind {
    /// Train on the simulator's own reward.
    #[default]
    None,
    CrossTrackSpeed,
}

impl RewardShapingKind {
    pub fn build(self, max_cte: f64) -> Option<Arc<dyn RewardShaper>> {
        match self {
            RewardShapingKind::None => None,
            RewardShapingKind::CrossTrackSpeed => {
                Some(Arc::new(CrossTrackSpeedReward::new(max_cte)))
            }
        }
    }
}

/// Rewards staying near the centre line and pressing on; a crash costs a
/// fixed penalty that grows with throttle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossTrackSpeedReward {
    pub max_cte: f64,
    pub crash_penalty: f64,
    pub throttle_weight: f64,
}

impl CrossTrackSpeedReward {
    pub fn new(max_cte: f64) -> Self {
        CrossTrackSpeedReward {
            max_cte,
            crash_penalty: 10.0,
            throttle_weight: 0.1,
        }
    }
}

impl RewardShaper for CrossTrackSpeedReward {
    fn shape(&self, raw_reward: f64, info: &StepInfo, action: &Action, done: bool) -> f64 {
        let throttle = f64::from(action.throttle);
        if done {
            return -self.crash_penalty - self.throttle_weight * throttle;
        }
        let Some(cte) = info.get(info_keys::CTE) else {
            return raw_reward;
        };
        let centred = (1.0 - cte.abs() / self.max_cte).max(0.0);
        centred + self.throttle_weight * throttle
    }
}

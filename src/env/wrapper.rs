use std::sync::Arc;

use tracing::{debug, warn};

use super::{info_keys, Environment, RewardShaper, Step, StepInfo};
use crate::encoder::{Frame, ObservationEncoder};
use crate::error::EnvError;
use crate::policy::Action;

/// Whether rewards pass through untouched or go through a shaper.
#[derive(Clone, Default)]
pub enum EnvMode {
    Training {
        shaper: Option<Arc<dyn RewardShaper>>,
    },
    #[default]
    Evaluation,
}

impl std::fmt::Debug for EnvMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvMode::Training { shaper } => f
                .debug_struct("Training")
                .field("shaped", &shaper.is_some())
                .finish(),
            EnvMode::Evaluation => f.write_str("Evaluation"),
        }
    }
}

/// Step info after validation: the two telemetry fields every consumer
/// needs, plus everything the inner environment reported.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveInfo {
    pub distance: f64,
    pub speed: f64,
    pub raw: StepInfo,
}

impl DriveInfo {
    fn from_step_info(raw: StepInfo) -> Result<Self, EnvError> {
        let field = |name: &'static str| {
            raw.get(name)
                .copied()
                .ok_or(EnvError::TelemetryUnavailable { field: name })
        };
        let distance = field(info_keys::DISTANCE)?;
        let speed = field(info_keys::SPEED)?;
        Ok(DriveInfo {
            distance,
            speed,
            raw,
        })
    }
}

/// Raw environment plus frozen encoder plus optional reward shaping.
///
/// Owns the inner environment and closes it exactly once, on
/// [`Environment::close`] or on drop.
pub struct EncodedEnv<E, Enc>
where
    E: Environment<Observation = Frame, Info = StepInfo>,
    Enc: ObservationEncoder + ?Sized,
{
    inner: E,
    encoder: Arc<Enc>,
    mode: EnvMode,
    closed: bool,
}

impl<E, Enc> EncodedEnv<E, Enc>
where
    E: Environment<Observation = Frame, Info = StepInfo>,
    Enc: ObservationEncoder + ?Sized,
{
    pub fn new(inner: E, encoder: Arc<Enc>, mode: EnvMode) -> Self {
        EncodedEnv {
            inner,
            encoder,
            mode,
            closed: false,
        }
    }

    pub fn training(inner: E, encoder: Arc<Enc>, shaper: Option<Arc<dyn RewardShaper>>) -> Self {
        Self::new(inner, encoder, EnvMode::Training { shaper })
    }

    pub fn evaluation(inner: E, encoder: Arc<Enc>) -> Self {
        Self::new(inner, encoder, EnvMode::Evaluation)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        Ok(())
    }
}

impl<E, Enc> Environment for EncodedEnv<E, Enc>
where
    E: Environment<Observation = Frame, Info = StepInfo>,
    Enc: ObservationEncoder + ?Sized,
{
    type Observation = Vec<f32>;
    type Info = DriveInfo;

    fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.ensure_open()?;
        let frame = self.inner.reset()?;
        Ok(self.encoder.encode(&frame)?)
    }

    fn step(&mut self, action: &Action) -> Result<Step<Vec<f32>, DriveInfo>, EnvError> {
        self.ensure_open()?;
        let step = self.inner.step(action)?;

        // Telemetry first: a missing field is reported even if the frame is bad too.
        let info = DriveInfo::from_step_info(step.info)?;
        let reward = match &self.mode {
            EnvMode::Training {
                shaper: Some(shaper),
            } => shaper.shape(step.reward, &info.raw, action, step.done),
            _ => step.reward,
        };
        let observation = self.encoder.encode(&step.observation)?;

        Ok(Step {
            observation,
            reward,
            done: step.done,
            info,
        })
    }

    fn seed(&mut self, seed: u64) {
        self.inner.seed(seed);
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(mode = ?self.mode, "closing wrapped environment");
        self.inner.close()
    }
}

impl<E, Enc> Drop for EncodedEnv<E, Enc>
where
    E: Environment<Observation = Frame, Info = StepInfo>,
    Enc: ObservationEncoder + ?Sized,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close environment on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingEncoder, ScriptedEnv};

    fn encoder() -> Arc<CountingEncoder> {
        Arc::new(CountingEncoder::new([8, 8, 3], 4))
    }

    #[test]
    fn test_reset_and_step_return_latents() {
        let mut env = EncodedEnv::evaluation(ScriptedEnv::new([8, 8, 3]), encoder());
        assert_eq!(env.reset().unwrap().len(), 4);
        let step = env.step(&Action::new(0.0, 0.5)).unwrap();
        assert_eq!(step.observation.len(), 4);
        assert_eq!(step.info.distance, 0.5);
        assert!(step.info.raw.contains_key(info_keys::CTE));
    }

    #[test]
    fn test_evaluation_passes_raw_reward_through() {
        let shaper: Arc<dyn RewardShaper> =
            Arc::new(|_: f64, _: &StepInfo, _: &Action, _: bool| 100.0);
        let inner = ScriptedEnv::new([8, 8, 3]).with_reward(0.25);

        let mut eval = EncodedEnv::evaluation(inner.clone(), encoder());
        eval.reset().unwrap();
        assert_eq!(eval.step(&Action::default()).unwrap().reward, 0.25);

        let mut train = EncodedEnv::training(inner, encoder(), Some(shaper));
        train.reset().unwrap();
        assert_eq!(train.step(&Action::default()).unwrap().reward, 100.0);
    }

    #[test]
    fn test_training_without_shaper_keeps_raw_reward() {
        let inner = ScriptedEnv::new([8, 8, 3]).with_reward(0.75);
        let mut env = EncodedEnv::training(inner, encoder(), None);
        env.reset().unwrap();
        assert_eq!(env.step(&Action::default()).unwrap().reward, 0.75);
    }

    #[test]
    fn test_missing_speed_is_telemetry_unavailable() {
        let inner = ScriptedEnv::new([8, 8, 3]).omit_field_at(1, info_keys::SPEED);
        let mut env = EncodedEnv::evaluation(inner, encoder());
        env.reset().unwrap();
        let err = env.step(&Action::default()).unwrap_err();
        assert!(matches!(err, EnvError::TelemetryUnavailable { field: "speed" }));
    }

    #[test]
    fn test_shape_mismatch_surfaces_as_encoding_error() {
        let inner = ScriptedEnv::new([80, 80, 3]);
        let counting = Arc::new(CountingEncoder::new([64, 64, 3], 4));
        let mut env = EncodedEnv::evaluation(inner, counting.clone());
        let err = env.reset().unwrap_err();
        assert!(matches!(err, EnvError::Encoding(_)));
        assert_eq!(counting.successful_calls(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let inner = ScriptedEnv::new([8, 8, 3]);
        let log = inner.log();
        let mut env = EncodedEnv::evaluation(inner, encoder());
        env.close().unwrap();
        env.close().unwrap();
        assert!(env.is_closed());
        assert!(matches!(env.reset(), Err(EnvError::Closed)));
        drop(env);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_drop_closes_inner() {
        let inner = ScriptedEnv::new([8, 8, 3]);
        let log = inner.log();
        {
            let mut env = EncodedEnv::evaluation(inner, encoder());
            env.reset().unwrap();
        }
        assert_eq!(log.closes(), 1);
    }
}

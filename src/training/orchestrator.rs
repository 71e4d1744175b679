use std::mem;
use std::path::PathBuf;

use tracing::{debug, error, info};

use super::interrupt::StopFlag;
use super::metrics::{EpisodeStats, TrainingMetrics};
use super::session::TrainingSession;
use super::TrainingConfig;
use crate::checkpoint::CheckpointWriter;
use crate::env::{DriveInfo, Environment};
use crate::error::TrainingError;
use crate::policy::{PpoConfig, RolloutBuffer, TrainablePolicy, Transition};
use crate::seeding::{derive_seed, seed_run};
use crate::telemetry::TelemetryRecorder;

pub const EPISODE_REWARD: &str = "rollout/ep_rew";
pub const EPISODE_LENGTH: &str = "rollout/ep_len";
pub const LOSS: &str = "train/loss";
pub const POLICY_LOSS: &str = "train/policy_loss";
pub const VALUE_LOSS: &str = "train/value_loss";
pub const ENTROPY: &str = "train/entropy";

/// How the training loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub outcome: TrainingOutcome,
    pub timesteps: u64,
    pub episodes: u64,
    /// File the final model was written to.
    pub final_model: PathBuf,
}

/// Rollout shape and GAE parameters the loop needs from the learner config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutSettings {
    pub n_steps: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
}

impl From<&PpoConfig> for RolloutSettings {
    fn from(config: &PpoConfig) -> Self {
        RolloutSettings {
            n_steps: config.n_steps,
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
        }
    }
}

/// Runs the on-policy optimisation loop with periodic checkpoints and a
/// guaranteed final save.
#[derive(Debug, Clone)]
pub struct TrainingOrchestrator {
    config: TrainingConfig,
    rollout: RolloutSettings,
}

#[derive(Debug, Default)]
struct Progress {
    timesteps: u64,
    episodes: u64,
    interrupted: bool,
}

impl TrainingOrchestrator {
    pub fn new(config: TrainingConfig, rollout: RolloutSettings) -> Self {
        TrainingOrchestrator { config, rollout }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `agent` on `env` until the step budget is spent or `stop` is
    /// raised.
    ///
    /// Whatever happens inside the loop, including a panic, the session is
    /// finalized before this returns or unwinds. A loop failure is returned
    /// after finalization and never resumed.
    pub fn run<E, A, R>(
        &self,
        env: E,
        agent: A,
        recorder: R,
        stop: &StopFlag,
    ) -> Result<TrainingReport, TrainingError>
    where
        E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
        A: TrainablePolicy,
        R: TelemetryRecorder,
    {
        info!(
            algorithm = agent.algorithm_name(),
            total_timesteps = self.config.total_timesteps,
            seed = self.config.seed,
            "starting training"
        );
        let mut session = TrainingSession::new(env, agent, recorder, &self.config.model_path);
        let mut progress = Progress::default();

        let outcome = self.train(&mut session, &mut progress, stop);
        session.set_timesteps(progress.timesteps);
        let finalized = session.finalize();

        match (outcome, finalized) {
            (Ok(()), Ok(final_model)) => Ok(TrainingReport {
                outcome: if progress.interrupted {
                    TrainingOutcome::Interrupted
                } else {
                    TrainingOutcome::Completed
                },
                timesteps: progress.timesteps,
                episodes: progress.episodes,
                final_model,
            }),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(finalize_err)) => {
                error!(error = %finalize_err, "finalization also failed");
                Err(e)
            }
        }
    }

    fn train<E, A, R>(
        &self,
        session: &mut TrainingSession<E, A, R>,
        progress: &mut Progress,
        stop: &StopFlag,
    ) -> Result<(), TrainingError>
    where
        E: Environment<Observation = Vec<f32>, Info = DriveInfo>,
        A: TrainablePolicy,
        R: TelemetryRecorder,
    {
        let config = &self.config;
        let writer = CheckpointWriter::new(
            &config.checkpoint_dir,
            &config.checkpoint_prefix,
            config.checkpoint_interval,
        )?;
        let (env, agent, recorder) = session.parts();

        seed_run(config.seed, env, agent);
        let mut observation = env
            .reset()
            .map_err(|source| TrainingError::Env { step: 0, source })?;
        let mut buffer = RolloutBuffer::new(self.rollout.n_steps, observation.len());
        let mut metrics = TrainingMetrics::new();
        let mut episode_reward = 0.0f64;
        let mut episode_length = 0u64;
        let log_window = 10;

        for step in 1..=config.total_timesteps {
            if stop.is_stop_requested() {
                info!(step = progress.timesteps, "stop requested, leaving training loop");
                progress.interrupted = true;
                break;
            }

            let sample = agent
                .act(&observation)
                .map_err(|source| TrainingError::Policy { step, source })?;
            let result = env
                .step(&sample.action)
                .map_err(|source| TrainingError::Env { step, source })?;
            progress.timesteps = step;
            metrics.record_step();
            episode_reward += result.reward;
            episode_length += 1;

            buffer.push(Transition {
                observation: mem::replace(&mut observation, result.observation),
                raw_action: sample.raw,
                log_prob: sample.log_prob,
                value: sample.value,
                reward: result.reward as f32,
                done: result.done,
            });

            if result.done {
                progress.episodes += 1;
                recorder.add_scalar(EPISODE_REWARD, step, episode_reward)?;
                recorder.add_scalar(EPISODE_LENGTH, step, episode_length as f64)?;
                metrics.record_episode(EpisodeStats {
                    reward: episode_reward,
                    length: episode_length,
                });
                debug!(
                    step,
                    reward = episode_reward,
                    length = episode_length,
                    distance = result.info.distance,
                    "episode finished"
                );
                episode_reward = 0.0;
                episode_length = 0;

                env.seed(derive_seed(config.seed, progress.episodes as usize));
                observation = env
                    .reset()
                    .map_err(|source| TrainingError::Env { step, source })?;
            }

            if buffer.is_full() {
                let last_value = agent
                    .value(&observation)
                    .map_err(|source| TrainingError::Policy { step, source })?;
                buffer.finish(last_value, self.rollout.gamma, self.rollout.gae_lambda);
                let update = agent
                    .update(&buffer)
                    .map_err(|source| TrainingError::Policy { step, source })?;
                buffer.clear();

                metrics.record_update(update.loss);
                recorder.add_scalar(LOSS, step, update.loss as f64)?;
                recorder.add_scalar(POLICY_LOSS, step, update.policy_loss as f64)?;
                recorder.add_scalar(VALUE_LOSS, step, update.value_loss as f64)?;
                recorder.add_scalar(ENTROPY, step, update.entropy as f64)?;
            }

            if writer.should_save(step) {
                writer.save(&*agent, step)?;
            }

            if step % config.log_interval.max(1) == 0 {
                info!(
                    step,
                    total = config.total_timesteps,
                    episodes = metrics.total_episodes(),
                    avg_reward = metrics.average_reward(log_window),
                    avg_length = metrics.average_length(log_window),
                    loss = metrics.average_loss(log_window),
                    steps_per_sec = metrics.steps_per_sec(),
                    "training progress"
                );
                metrics.reset_window();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::checkpoint::discover_checkpoints;
    use crate::env::EncodedEnv;
    use crate::error::PolicyError;
    use crate::testing::{
        CountingEncoder, Journal, JournalRecorder, ScriptedAgent, ScriptedEnv,
    };
    use crate::training::COMPLETED;

    fn config(dir: &Path, total: u64) -> TrainingConfig {
        TrainingConfig {
            total_timesteps: total,
            checkpoint_interval: 10,
            checkpoint_dir: dir.join("checkpoints"),
            model_path: dir.join("ppo_donkeycar"),
            monitoring_dir: dir.join("monitor"),
            log_interval: 5,
            ..TrainingConfig::default()
        }
    }

    fn rollout(n_steps: usize) -> RolloutSettings {
        RolloutSettings {
            n_steps,
            gamma: 0.99,
            gae_lambda: 0.9,
        }
    }

    fn env(inner: ScriptedEnv) -> EncodedEnv<ScriptedEnv, CountingEncoder> {
        EncodedEnv::training(inner, Arc::new(CountingEncoder::new([4, 4, 3], 3)), None)
    }

    fn finalization_tail(journal: &Journal) -> Vec<String> {
        let entries = journal.entries();
        let start = entries
            .iter()
            .position(|e| e == "agent.save:ppo_donkeycar.mpk")
            .expect("final save missing");
        entries[start..].to_vec()
    }

    const FINALIZATION: [&str; 4] = [
        "agent.save:ppo_donkeycar.mpk",
        "env.close",
        "recorder.scalar:training/completed",
        "recorder.flush",
    ];

    #[test]
    fn test_completed_run_checkpoints_updates_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let inner = ScriptedEnv::new([4, 4, 3]).done_at(7).with_journal(journal.clone());
        let env_log = inner.log();
        let agent = ScriptedAgent::new(journal.clone());
        let agent_view = agent.clone();
        let recorder = JournalRecorder::new(journal.clone());
        let memory = recorder.memory();

        let report = TrainingOrchestrator::new(config(dir.path(), 30), rollout(8))
            .run(env(inner), agent, recorder, &StopFlag::new())
            .unwrap();

        assert_eq!(report.outcome, TrainingOutcome::Completed);
        assert_eq!(report.timesteps, 30);
        assert_eq!(report.episodes, 4);
        assert_eq!(report.final_model, dir.path().join("ppo_donkeycar.mpk"));
        assert!(report.final_model.is_file());

        assert_eq!(agent_view.updates(), 3);
        assert_eq!(memory.series(EPISODE_LENGTH), vec![(7, 7.0), (14, 7.0), (21, 7.0), (28, 7.0)]);
        assert_eq!(memory.series(LOSS).len(), 3);
        assert_eq!(memory.series(COMPLETED), vec![(30, 1.0)]);

        let steps: Vec<u64> = discover_checkpoints(&dir.path().join("checkpoints"))
            .unwrap()
            .iter()
            .map(|e| e.step)
            .collect();
        assert_eq!(steps, vec![10, 20, 30]);

        assert_eq!(env_log.resets(), 5);
        assert_eq!(env_log.closes(), 1);
        assert_eq!(journal.count("agent.seed:42"), 1);
        assert_eq!(finalization_tail(&journal), FINALIZATION);
    }

    #[test]
    fn test_interrupt_stops_loop_and_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let inner = ScriptedEnv::new([4, 4, 3]).with_journal(journal.clone());
        let env_log = inner.log();
        let stop = StopFlag::new();
        stop.request_stop();

        let report = TrainingOrchestrator::new(config(dir.path(), 1000), rollout(8))
            .run(
                env(inner),
                ScriptedAgent::new(journal.clone()),
                JournalRecorder::new(journal.clone()),
                &stop,
            )
            .unwrap();

        assert_eq!(report.outcome, TrainingOutcome::Interrupted);
        assert_eq!(report.timesteps, 0);
        assert_eq!(env_log.steps(), 0);
        assert_eq!(env_log.closes(), 1);
        assert_eq!(finalization_tail(&journal), FINALIZATION);
    }

    #[test]
    fn test_update_failure_is_returned_after_finalization() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let inner = ScriptedEnv::new([4, 4, 3]).with_journal(journal.clone());
        let env_log = inner.log();

        let err = TrainingOrchestrator::new(config(dir.path(), 100), rollout(4))
            .run(
                env(inner),
                ScriptedAgent::new(journal.clone()).failing_update(),
                JournalRecorder::new(journal.clone()),
                &StopFlag::new(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            TrainingError::Policy {
                step: 4,
                source: PolicyError::Inference(_)
            }
        ));
        // no further steps after the failure
        assert_eq!(env_log.steps(), 4);
        assert_eq!(env_log.closes(), 1);
        assert_eq!(finalization_tail(&journal), FINALIZATION);
        assert!(dir.path().join("ppo_donkeycar.mpk").is_file());
    }

    #[test]
    fn test_env_disconnect_is_returned_after_finalization() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let inner = ScriptedEnv::new([4, 4, 3]).disconnect_at(6).with_journal(journal.clone());

        let err = TrainingOrchestrator::new(config(dir.path(), 100), rollout(64))
            .run(
                env(inner),
                ScriptedAgent::new(journal.clone()),
                JournalRecorder::new(journal.clone()),
                &StopFlag::new(),
            )
            .unwrap_err();

        assert!(matches!(err, TrainingError::Env { step: 6, .. }));
        assert_eq!(finalization_tail(&journal), FINALIZATION);
    }

    #[test]
    fn test_panic_in_loop_still_finalizes_once() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::default();
        let inner = ScriptedEnv::new([4, 4, 3]).with_journal(journal.clone());
        let env_log = inner.log();
        let orchestrator = TrainingOrchestrator::new(config(dir.path(), 100), rollout(64));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            orchestrator.run(
                env(inner),
                ScriptedAgent::new(journal.clone()).panicking_after(3),
                JournalRecorder::new(journal.clone()),
                &StopFlag::new(),
            )
        }));

        assert!(result.is_err());
        assert_eq!(env_log.closes(), 1);
        assert_eq!(journal.count("agent.save:ppo_donkeycar.mpk"), 1);
        assert_eq!(finalization_tail(&journal), FINALIZATION);
    }
}

//! Test doubles shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::encoder::{Frame, ObservationEncoder};
use crate::env::{info_keys, Environment, Step, StepInfo};
use crate::error::{CheckpointError, EncodingError, EnvError, PolicyError, TelemetryError};
use crate::policy::{
    Action, ActionSample, Policy, RolloutBuffer, TrainablePolicy, UpdateMetrics,
};
use crate::telemetry::{MemoryRecorder, TelemetryRecorder};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ordered record of side effects across several doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        lock(&self.0).iter().filter(|e| *e == entry).count()
    }
}

#[derive(Debug, Default)]
struct EnvCounters {
    resets: usize,
    steps: usize,
    closes: usize,
    seeds: Vec<u64>,
    actions: Vec<Action>,
}

/// Shared view of what a [`ScriptedEnv`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct EnvLog(Arc<Mutex<EnvCounters>>);

impl EnvLog {
    pub fn resets(&self) -> usize {
        lock(&self.0).resets
    }

    pub fn steps(&self) -> usize {
        lock(&self.0).steps
    }

    pub fn closes(&self) -> usize {
        lock(&self.0).closes
    }

    pub fn seeds(&self) -> Vec<u64> {
        lock(&self.0).seeds.clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.0).actions.clone()
    }
}

/// Raw environment with scripted telemetry. Frames depend on the seed and the
/// step index, so seeded runs are reproducible and distinct.
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    shape: [usize; 3],
    reward: f64,
    done_at: Option<u64>,
    omit: Option<(u64, &'static str)>,
    disconnect_at: Option<u64>,
    step: u64,
    seed: u64,
    log: EnvLog,
    journal: Option<Journal>,
}

impl ScriptedEnv {
    pub fn new(shape: [usize; 3]) -> Self {
        ScriptedEnv {
            shape,
            reward: 1.0,
            done_at: None,
            omit: None,
            disconnect_at: None,
            step: 0,
            seed: 0,
            log: EnvLog::default(),
            journal: None,
        }
    }

    pub fn with_reward(mut self, reward: f64) -> Self {
        self.reward = reward;
        self
    }

    /// Signal `done` on this step of every episode.
    pub fn done_at(mut self, step: u64) -> Self {
        self.done_at = Some(step);
        self
    }

    pub fn omit_field_at(mut self, step: u64, field: &'static str) -> Self {
        self.omit = Some((step, field));
        self
    }

    pub fn disconnect_at(mut self, step: u64) -> Self {
        self.disconnect_at = Some(step);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn log(&self) -> EnvLog {
        self.log.clone()
    }

    fn frame(&self) -> Frame {
        let value = ((self.seed % 7) as f32 + self.step as f32) % 10.0 / 10.0;
        let [h, w, c] = self.shape;
        let pixels = (0..h * w * c)
            .map(|i| (value + i as f32 * 1e-3) % 1.0)
            .collect();
        Frame::new(h, w, c, pixels).unwrap_or_else(|_| Frame::zeros(h, w, c))
    }
}

impl Environment for ScriptedEnv {
    type Observation = Frame;
    type Info = StepInfo;

    fn reset(&mut self) -> Result<Frame, EnvError> {
        lock(&self.log.0).resets += 1;
        self.step = 0;
        Ok(self.frame())
    }

    fn step(&mut self, action: &Action) -> Result<Step<Frame, StepInfo>, EnvError> {
        {
            let mut log = lock(&self.log.0);
            log.steps += 1;
            log.actions.push(*action);
        }
        self.step += 1;
        let t = self.step;
        if self.disconnect_at == Some(t) {
            return Err(EnvError::SimulatorClosed);
        }

        let mut info = StepInfo::from([
            (info_keys::DISTANCE.to_string(), t as f64 * 0.5),
            (info_keys::SPEED.to_string(), 1.0 + (t % 5) as f64 * 0.1),
            (info_keys::CTE.to_string(), 0.0),
            (info_keys::HIT.to_string(), 0.0),
        ]);
        if let Some((step, field)) = self.omit {
            if step == t {
                info.remove(field);
            }
        }

        Ok(Step {
            observation: self.frame(),
            reward: self.reward,
            done: self.done_at == Some(t),
            info,
        })
    }

    fn seed(&mut self, seed: u64) {
        self.seed = seed;
        lock(&self.log.0).seeds.push(seed);
    }

    fn close(&mut self) -> Result<(), EnvError> {
        lock(&self.log.0).closes += 1;
        if let Some(journal) = &self.journal {
            journal.push("env.close");
        }
        Ok(())
    }
}

/// Encoder double: checks the shape, then emits the mean pixel value shifted
/// per latent slot.
#[derive(Debug)]
pub struct CountingEncoder {
    shape: [usize; 3],
    latent_dim: usize,
    calls: AtomicUsize,
}

impl CountingEncoder {
    pub fn new(shape: [usize; 3], latent_dim: usize) -> Self {
        CountingEncoder {
            shape,
            latent_dim,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn successful_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObservationEncoder for CountingEncoder {
    fn input_shape(&self) -> [usize; 3] {
        self.shape
    }

    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<f32>, EncodingError> {
        if frame.shape() != self.shape {
            return Err(EncodingError::ShapeMismatch {
                expected: self.shape,
                actual: frame.shape(),
            });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pixels = frame.pixels();
        let mean = pixels.iter().sum::<f32>() / pixels.len().max(1) as f32;
        Ok((0..self.latent_dim).map(|i| mean + i as f32 * 0.01).collect())
    }
}

#[derive(Debug, Default)]
struct PolicyCounters {
    calls: usize,
    deterministic_calls: usize,
    seeds: Vec<u64>,
}

/// Shared view of a [`FixedPolicy`]'s calls.
#[derive(Debug, Clone, Default)]
pub struct PolicyLog(Arc<Mutex<PolicyCounters>>);

impl PolicyLog {
    pub fn calls(&self) -> usize {
        lock(&self.0).calls
    }

    pub fn deterministic_calls(&self) -> usize {
        lock(&self.0).deterministic_calls
    }

    pub fn seeds(&self) -> Vec<u64> {
        lock(&self.0).seeds.clone()
    }
}

/// Deterministic policy: steering mirrors the first latent value, throttle
/// is fixed.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    throttle: f32,
    log: PolicyLog,
}

impl FixedPolicy {
    pub fn new(throttle: f32) -> Self {
        FixedPolicy {
            throttle,
            log: PolicyLog::default(),
        }
    }

    pub fn log(&self) -> PolicyLog {
        self.log.clone()
    }
}

impl Policy for FixedPolicy {
    fn predict(&mut self, observation: &[f32], deterministic: bool) -> Result<Action, PolicyError> {
        {
            let mut log = lock(&self.log.0);
            log.calls += 1;
            if deterministic {
                log.deterministic_calls += 1;
            }
        }
        let steering = observation.first().copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        Ok(Action::new(steering, self.throttle))
    }

    fn reseed(&mut self, seed: u64) {
        lock(&self.log.0).seeds.push(seed);
    }
}

/// Trainable double that never learns; records saves and updates.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    journal: Journal,
    updates: Arc<AtomicUsize>,
    fail_update: bool,
    panic_on_act_after: Option<usize>,
    acts: usize,
}

impl ScriptedAgent {
    pub fn new(journal: Journal) -> Self {
        ScriptedAgent {
            journal,
            updates: Arc::new(AtomicUsize::new(0)),
            fail_update: false,
            panic_on_act_after: None,
            acts: 0,
        }
    }

    pub fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn panicking_after(mut self, acts: usize) -> Self {
        self.panic_on_act_after = Some(acts);
        self
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Policy for ScriptedAgent {
    fn predict(&mut self, _observation: &[f32], _deterministic: bool) -> Result<Action, PolicyError> {
        Ok(Action::new(0.0, 0.5))
    }

    fn reseed(&mut self, seed: u64) {
        self.journal.push(format!("agent.seed:{seed}"));
    }
}

impl TrainablePolicy for ScriptedAgent {
    fn act(&mut self, _observation: &[f32]) -> Result<ActionSample, PolicyError> {
        self.acts += 1;
        if let Some(limit) = self.panic_on_act_after {
            if self.acts > limit {
                panic!("scripted agent blew up");
            }
        }
        Ok(ActionSample {
            action: Action::new(0.0, 0.5),
            raw: [0.0, 0.5],
            log_prob: -1.0,
            value: 0.0,
        })
    }

    fn value(&self, _observation: &[f32]) -> Result<f32, PolicyError> {
        Ok(0.0)
    }

    fn update(&mut self, rollout: &RolloutBuffer) -> Result<UpdateMetrics, PolicyError> {
        if self.fail_update {
            return Err(PolicyError::Inference("scripted update failure".into()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(UpdateMetrics {
            loss: rollout.len() as f32,
            ..Default::default()
        })
    }

    fn save(&self, path: &Path) -> Result<PathBuf, CheckpointError> {
        let file = crate::checkpoint::weights_file(path);
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file, b"weights")?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.journal.push(format!("agent.save:{name}"));
        Ok(file)
    }

    fn algorithm_name(&self) -> &str {
        "scripted"
    }
}

/// Memory recorder that also journals each call.
#[derive(Debug, Clone)]
pub struct JournalRecorder {
    memory: MemoryRecorder,
    journal: Journal,
}

impl JournalRecorder {
    pub fn new(journal: Journal) -> Self {
        JournalRecorder {
            memory: MemoryRecorder::new(),
            journal,
        }
    }

    pub fn memory(&self) -> MemoryRecorder {
        self.memory.clone()
    }
}

impl TelemetryRecorder for JournalRecorder {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError> {
        self.journal.push(format!("recorder.scalar:{tag}"));
        self.memory.add_scalar(tag, step, value)
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.journal.push("recorder.flush");
        self.memory.flush()
    }
}

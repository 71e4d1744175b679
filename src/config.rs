use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoder::conv_stack_output;
use crate::error::ConfigError;
use crate::evaluation::EvaluationConfig;
use crate::policy::PpoConfig;
use crate::training::TrainingConfig;

/// Connection and episode settings for the simulated vehicle.
///
/// `host`, `port`, `car_identifier` and `max_cross_track_error` have no
/// defaults: a config file without them fails to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulator binary to launch. When absent, a running simulator is assumed.
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub car_identifier: String,
    /// Episode ends once |cross-track error| exceeds this.
    pub max_cross_track_error: f64,
    #[serde(default = "default_scene")]
    pub scene: String,
    #[serde(default = "default_body_style")]
    pub body_style: String,
    #[serde(default = "default_camera_size")]
    pub camera_width: usize,
    #[serde(default = "default_camera_size")]
    pub camera_height: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: f64,
    #[serde(default = "default_start_delay")]
    pub start_delay_secs: f64,
}

fn default_scene() -> String {
    "generated_track".into()
}

fn default_body_style() -> String {
    "donkey".into()
}

fn default_camera_size() -> usize {
    64
}

fn default_connect_timeout() -> f64 {
    30.0
}

fn default_step_timeout() -> f64 {
    10.0
}

fn default_start_delay() -> f64 {
    5.0
}

impl SimConfig {
    /// Config for an already running simulator; optional keys take defaults.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        car_identifier: impl Into<String>,
        max_cross_track_error: f64,
    ) -> Self {
        SimConfig {
            executable_path: None,
            host: host.into(),
            port,
            car_identifier: car_identifier.into(),
            max_cross_track_error,
            scene: default_scene(),
            body_style: default_body_style(),
            camera_width: default_camera_size(),
            camera_height: default_camera_size(),
            connect_timeout_secs: default_connect_timeout(),
            step_timeout_secs: default_step_timeout(),
            start_delay_secs: default_start_delay(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation("sim.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("sim.port must be > 0".into()));
        }
        if self.car_identifier.trim().is_empty() {
            return Err(ConfigError::Validation(
                "sim.car_identifier must not be empty".into(),
            ));
        }
        if self.max_cross_track_error <= 0.0 {
            return Err(ConfigError::Validation(
                "sim.max_cross_track_error must be > 0".into(),
            ));
        }
        if self.scene.trim().is_empty() {
            return Err(ConfigError::Validation("sim.scene must not be empty".into()));
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(ConfigError::Validation(
                "sim.camera_width and sim.camera_height must be > 0".into(),
            ));
        }
        if self.connect_timeout_secs <= 0.0 || self.step_timeout_secs <= 0.0 {
            return Err(ConfigError::Validation(
                "sim timeouts must be > 0".into(),
            ));
        }
        if self.start_delay_secs < 0.0 {
            return Err(ConfigError::Validation(
                "sim.start_delay_secs must be >= 0".into(),
            ));
        }
        if let Some(path) = &self.executable_path {
            if !path.is_file() {
                return Err(ConfigError::Validation(format!(
                    "sim.executable_path {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Frozen observation encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub weights_path: PathBuf,
    pub input_height: usize,
    pub input_width: usize,
    pub input_channels: usize,
    pub latent_dim: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            weights_path: PathBuf::from("trained-models/vae-64.mpk"),
            input_height: 64,
            input_width: 64,
            input_channels: 3,
            latent_dim: 32,
        }
    }
}

impl EncoderConfig {
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_height, self.input_width, self.input_channels]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if conv_stack_output(self.input_height).is_none()
            || conv_stack_output(self.input_width).is_none()
        {
            return Err(ConfigError::Validation(format!(
                "encoder input {}x{} is too small for the convolution stack",
                self.input_height, self.input_width
            )));
        }
        if self.input_channels == 0 {
            return Err(ConfigError::Validation(
                "encoder.input_channels must be > 0".into(),
            ));
        }
        if self.latent_dim == 0 {
            return Err(ConfigError::Validation(
                "encoder.latent_dim must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Where scalar telemetry goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub tensorboard_dir: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            tensorboard_dir: PathBuf::from("tensorboard"),
        }
    }
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sim: SimConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub ppo: PpoConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Defaults everywhere except the mandatory simulator section.
    pub fn with_sim(sim: SimConfig) -> Self {
        AppConfig {
            sim,
            encoder: EncoderConfig::default(),
            ppo: PpoConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim.validate()?;
        self.encoder.validate()?;

        let ppo = &self.ppo;
        if ppo.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "ppo.learning_rate must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&ppo.gamma) {
            return Err(ConfigError::Validation(
                "ppo.gamma must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&ppo.gae_lambda) {
            return Err(ConfigError::Validation(
                "ppo.gae_lambda must be in [0, 1]".into(),
            ));
        }
        if ppo.clip_range <= 0.0 {
            return Err(ConfigError::Validation(
                "ppo.clip_range must be > 0".into(),
            ));
        }
        if ppo.ent_coef < 0.0 {
            return Err(ConfigError::Validation(
                "ppo.ent_coef must be >= 0".into(),
            ));
        }
        if ppo.vf_coef < 0.0 {
            return Err(ConfigError::Validation(
                "ppo.vf_coef must be >= 0".into(),
            ));
        }
        if ppo.max_grad_norm <= 0.0 {
            return Err(ConfigError::Validation(
                "ppo.max_grad_norm must be > 0".into(),
            ));
        }
        if ppo.n_epochs == 0 {
            return Err(ConfigError::Validation(
                "ppo.n_epochs must be >= 1".into(),
            ));
        }
        if ppo.n_steps == 0 {
            return Err(ConfigError::Validation(
                "ppo.n_steps must be >= 1".into(),
            ));
        }
        if ppo.minibatch_size == 0 || ppo.minibatch_size > ppo.n_steps {
            return Err(ConfigError::Validation(
                "ppo.minibatch_size must be in [1, ppo.n_steps]".into(),
            ));
        }
        if ppo.hidden_sizes.is_empty() || ppo.hidden_sizes.contains(&0) {
            return Err(ConfigError::Validation(
                "ppo.hidden_sizes must be non-empty with positive widths".into(),
            ));
        }
        if !ppo.action_bounds.is_valid() {
            return Err(ConfigError::Validation(
                "ppo.action_bounds must have min < max for steering and throttle".into(),
            ));
        }

        if self.training.total_timesteps == 0 {
            return Err(ConfigError::Validation(
                "training.total_timesteps must be > 0".into(),
            ));
        }
        if self.training.checkpoint_interval == 0 {
            return Err(ConfigError::Validation(
                "training.checkpoint_interval must be > 0".into(),
            ));
        }
        if self.training.log_interval == 0 {
            return Err(ConfigError::Validation(
                "training.log_interval must be > 0".into(),
            ));
        }
        if self.training.checkpoint_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "training.checkpoint_prefix must not be empty".into(),
            ));
        }

        if self.evaluation.max_timesteps == 0 {
            return Err(ConfigError::Validation(
                "evaluation.max_timesteps must be > 0".into(),
            ));
        }
        if self.evaluation.run_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "evaluation.run_prefix must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// A TOML document with every option spelled out, for bootstrapping a
    /// config file.
    pub fn example_toml() -> String {
        let example = AppConfig::with_sim(SimConfig::new("127.0.0.1", 9091, "training", 4.0));
        toml::to_string_pretty(&example).expect("default config serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::RewardShapingKind;
    use std::io::Write;

    const MINIMAL: &str = r#"
[sim]
host = "127.0.0.1"
port = 9091
car_identifier = "training"
max_cross_track_error = 4.0
"#;

    fn valid() -> AppConfig {
        AppConfig::from_toml(MINIMAL).unwrap()
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = valid();
        assert_eq!(config.sim.port, 9091);
        assert_eq!(config.sim.scene, "generated_track");
        assert!(config.sim.executable_path.is_none());
        assert_eq!(config.encoder.input_shape(), [64, 64, 3]);
        assert!((config.ppo.learning_rate - 3e-4).abs() < 1e-12);
        assert_eq!(config.training.checkpoint_interval, 1000);
        assert_eq!(config.evaluation.max_timesteps, 5000);
        assert_eq!(config.training.reward_shaping, RewardShapingKind::None);
    }

    #[test]
    fn test_missing_sim_section_fails() {
        let err = AppConfig::from_toml("[ppo]\nlearning_rate = 0.001\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_missing_required_sim_key_fails() {
        let toml_str = r#"
[sim]
host = "127.0.0.1"
port = 9091
car_identifier = "training"
"#;
        let err = AppConfig::from_toml(toml_str).unwrap_err();
        assert!(
            err.to_string().contains("max_cross_track_error"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml_str = format!("{MINIMAL}\n[ppo]\nlearning_rate = 0.001\n");
        let config = AppConfig::from_toml(&toml_str).unwrap();
        assert!((config.ppo.learning_rate - 0.001).abs() < 1e-12);
        assert!((config.ppo.gamma - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{MINIMAL}\n[training]\ntotal_timesteps = 500\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.total_timesteps, 500);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = AppConfig::load(Path::new("no_such_config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_example_toml_roundtrips() {
        let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.sim.car_identifier, "training");
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut config = valid();
        config.sim.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_blank_car_identifier() {
        let mut config = valid();
        config.sim.car_identifier = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nonpositive_cte() {
        let mut config = valid();
        config.sim.max_cross_track_error = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_missing_executable() {
        let mut config = valid();
        config.sim.executable_path = Some(PathBuf::from("/definitely/not/donkey_sim.x86_64"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_tiny_encoder_input() {
        let mut config = valid();
        config.encoder.input_height = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_gamma() {
        let mut config = valid();
        config.ppo.gamma = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_minibatch_larger_than_rollout() {
        let mut config = valid();
        config.ppo.n_steps = 32;
        config.ppo.minibatch_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_checkpoint_interval() {
        let mut config = valid();
        config.training.checkpoint_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_eval_budget() {
        let mut config = valid();
        config.evaluation.max_timesteps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_action_bounds() {
        let mut config = valid();
        config.ppo.action_bounds.throttle_min = 1.0;
        config.ppo.action_bounds.throttle_max = 0.0;
        assert!(config.validate().is_err());
    }
}

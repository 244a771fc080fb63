use std::fmt;
use std::str::FromStr;

use burn::config::Config;

use crate::error::PpoError;

/// Hyperparameters of one training session. Fixed for the whole run.
#[derive(Config, Debug)]
pub struct PpoConfig {
    #[config(default = 0.0005)]
    pub learning_rate: f64,
    #[config(default = 0.99)]
    pub gamma: f32,
    #[config(default = 0.95)]
    pub gae_lambda: f32,
    #[config(default = 0.2)]
    pub epsilon_clip: f32,
    /// Gradient steps taken on every drained batch.
    #[config(default = 3)]
    pub update_epochs: usize,
    /// Maximum number of steps collected before an update.
    #[config(default = 2048)]
    pub horizon: usize,
    #[config(default = 0.01)]
    pub entropy_coef: f32,
    #[config(default = 1000)]
    pub max_episodes: usize,
    /// Rewards are divided by this before they are stored for training.
    /// Episode returns reported in metrics stay unscaled.
    #[config(default = 100.0)]
    pub reward_scale: f32,
    /// Completed episodes per metric sample.
    #[config(default = 20)]
    pub print_interval: usize,
    #[config(default = "vec![256, 128]")]
    pub hidden_dims: Vec<usize>,
    /// Clip gradients to this global norm before the optimizer step.
    pub grad_clip_norm: Option<f32>,
    #[config(default = 0)]
    pub seed: u64,
    /// Write TensorBoard scalars under this directory.
    pub logdir: Option<String>,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PpoConfig {
    /// Rejects out-of-range values before a session starts.
    pub fn validate(&self) -> Result<(), PpoError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PpoError::invalid(
                "learning_rate",
                format!("must be a positive number, got {}", self.learning_rate),
            ));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(PpoError::invalid(
                "gamma",
                format!("must be in (0, 1], got {}", self.gamma),
            ));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(PpoError::invalid(
                "gae_lambda",
                format!("must be in [0, 1], got {}", self.gae_lambda),
            ));
        }
        if !(self.epsilon_clip.is_finite() && self.epsilon_clip > 0.0) {
            return Err(PpoError::invalid(
                "epsilon_clip",
                format!("must be positive, got {}", self.epsilon_clip),
            ));
        }
        if !(self.entropy_coef.is_finite() && self.entropy_coef >= 0.0) {
            return Err(PpoError::invalid(
                "entropy_coef",
                format!("must be non-negative, got {}", self.entropy_coef),
            ));
        }
        if !(self.reward_scale.is_finite() && self.reward_scale > 0.0) {
            return Err(PpoError::invalid(
                "reward_scale",
                format!("must be positive, got {}", self.reward_scale),
            ));
        }
        let counts = [
            ("update_epochs", self.update_epochs),
            ("horizon", self.horizon),
            ("max_episodes", self.max_episodes),
            ("print_interval", self.print_interval),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(PpoError::invalid(field, "must be at least 1"));
            }
        }
        if self.hidden_dims.is_empty() || self.hidden_dims.contains(&0) {
            return Err(PpoError::invalid(
                "hidden_dims",
                format!("needs at least one non-zero layer, got {:?}", self.hidden_dims),
            ));
        }
        if let Some(norm) = self.grad_clip_norm {
            if !(norm.is_finite() && norm > 0.0) {
                return Err(PpoError::invalid(
                    "grad_clip_norm",
                    format!("must be positive, got {}", norm),
                ));
            }
        }
        Ok(())
    }

    pub fn save_json(&self, path: &str) -> Result<(), PpoError> {
        self.save(path)
            .map_err(|e| PpoError::ConfigIo(format!("{}: {}", path, e)))
    }

    pub fn load_json(path: &str) -> Result<Self, PpoError> {
        let config =
            Self::load(path).map_err(|e| PpoError::ConfigIo(format!("{}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Named hyperparameter bundles for comparing runs.
///
/// Each preset only overrides the learning rate, the clip range and the
/// entropy coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Baseline,
    HighClip,
    NoEntropy,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Baseline, Preset::HighClip, Preset::NoEntropy];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Baseline => "Baseline (Stable PPO)",
            Preset::HighClip => "High Clip (Policy Collapse)",
            Preset::NoEntropy => "No Entropy (Local Minima)",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Preset::Baseline => "baseline",
            Preset::HighClip => "high-clip",
            Preset::NoEntropy => "no-entropy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::Baseline => "Recommended settings; expect a steadily rising curve.",
            Preset::HighClip => "Clip range too wide; training becomes unstable or collapses.",
            Preset::NoEntropy => "No exploration bonus; may converge early below the best score.",
        }
    }

    /// (learning_rate, epsilon_clip, entropy_coef)
    fn values(&self) -> (f64, f32, f32) {
        match self {
            Preset::Baseline => (0.0005, 0.2, 0.01),
            Preset::HighClip => (0.0005, 0.8, 0.01),
            Preset::NoEntropy => (0.0005, 0.2, 0.0),
        }
    }

    pub fn apply(&self, config: PpoConfig) -> PpoConfig {
        let (learning_rate, epsilon_clip, entropy_coef) = self.values();
        config
            .with_learning_rate(learning_rate)
            .with_epsilon_clip(epsilon_clip)
            .with_entropy_coef(entropy_coef)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = PpoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Preset::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(wanted) || p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PpoError::invalid("preset", format!("unknown preset `{}`", s)))
    }
}

pub mod burn_utils;
pub mod error;
pub mod rl_algorithm;
pub mod rl_env;

pub use error::PpoError;
pub use rl_algorithm::base::metric::MetricSample;
pub use rl_algorithm::base::on_policy_runner::{adam_optimizer, ppo_runner, OnPolicyRunner, StopHandle};
pub use rl_algorithm::ppo::config::{PpoConfig, Preset};
pub use rl_algorithm::preload_net::actor_critic::{ActorCritic, ActorCriticConfig};
pub use rl_env::env::{Environment, Observation, StepOutcome};

pub type MyPrecisionSettings = burn::record::FullPrecisionSettings;

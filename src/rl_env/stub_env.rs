//! Deterministic environments used by the tests.
use anyhow::bail;
use ndarray::Array1;

use super::env::{Environment, Observation, StepOutcome};

/// Ends every episode after `episode_len` steps with a constant reward per step.
pub(crate) struct FixedEpisodeEnv {
    obs_dim: usize,
    action_dim: usize,
    episode_len: usize,
    reward: f32,
    truncate: bool,
    t: usize,
    pub resets: usize,
    pub steps: usize,
}

impl FixedEpisodeEnv {
    pub fn new(obs_dim: usize, action_dim: usize, episode_len: usize, reward: f32) -> Self {
        Self {
            obs_dim,
            action_dim,
            episode_len,
            reward,
            truncate: false,
            t: 0,
            resets: 0,
            steps: 0,
        }
    }

    /// Report the episode end as a truncation instead of a termination.
    pub fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    fn obs(&self) -> Observation {
        Array1::from_shape_fn(self.obs_dim, |i| (self.t + i) as f32 * 0.1)
    }
}

impl Environment for FixedEpisodeEnv {
    type Info = ();

    fn get_obs_dim(&self) -> usize {
        self.obs_dim
    }

    fn get_action_dim(&self) -> usize {
        self.action_dim
    }

    fn reset(&mut self) -> anyhow::Result<(Observation, ())> {
        self.t = 0;
        self.resets += 1;
        Ok((self.obs(), ()))
    }

    fn step(&mut self, action: usize) -> anyhow::Result<StepOutcome<()>> {
        if action >= self.action_dim {
            bail!("action {} out of range", action);
        }
        self.t += 1;
        self.steps += 1;
        let end = self.t >= self.episode_len;
        Ok(StepOutcome::new(
            self.obs(),
            self.reward,
            end && !self.truncate,
            end && self.truncate,
            (),
        ))
    }
}

/// Fails on the `fail_at`-th call to `step`.
pub(crate) struct FailingEnv {
    pub fail_at: usize,
    steps: usize,
}

impl FailingEnv {
    pub fn new(fail_at: usize) -> Self {
        Self { fail_at, steps: 0 }
    }
}

impl Environment for FailingEnv {
    type Info = ();

    fn get_obs_dim(&self) -> usize {
        2
    }

    fn get_action_dim(&self) -> usize {
        2
    }

    fn reset(&mut self) -> anyhow::Result<(Observation, ())> {
        Ok((Array1::zeros(2), ()))
    }

    fn step(&mut self, _action: usize) -> anyhow::Result<StepOutcome<()>> {
        self.steps += 1;
        if self.steps >= self.fail_at {
            bail!("simulator crashed at step {}", self.steps);
        }
        Ok(StepOutcome::new(Array1::zeros(2), 1.0, false, false, ()))
    }
}

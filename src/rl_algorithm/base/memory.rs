use burn::{
    prelude::Backend,
    tensor::{Int, Tensor},
};
use ndarray::{Array2, ArrayView1};

use crate::error::PpoError;
use crate::rl_env::env::Observation;

use super::rl_utils::{ndarray2tensor2, vec2column, vec2int_column};

/// One environment interaction as seen by the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub obs: Observation,
    pub action: usize,
    /// Reward after `reward_scale` has been applied.
    pub reward: f32,
    pub next_obs: Observation,
    /// Probability of `action` under the policy that selected it.
    pub action_prob: f32,
    /// Episode terminated. Truncation does not set this flag.
    pub done: bool,
}

impl Transition {
    pub fn new(
        obs: Observation,
        action: usize,
        reward: f32,
        next_obs: Observation,
        action_prob: f32,
        done: bool,
    ) -> Self {
        Self {
            obs,
            action,
            reward,
            next_obs,
            action_prob,
            done,
        }
    }
}

/// Transitions of the current rollout in arrival order.
#[derive(Debug, Default)]
pub struct Memory {
    transitions: Vec<Transition>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Hands over every recorded transition, oldest first, and leaves the buffer empty.
    pub fn drain(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    pub(crate) fn len(&self) -> usize {
        self.transitions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// A drained rollout laid out as tensors, row `t` holding transition `t`.
#[derive(Debug, Clone)]
pub struct TransitionBatch<B: Backend> {
    obs: Tensor<B, 2>,         // (N, obs_dim)
    action: Tensor<B, 2, Int>, // (N, 1)
    reward: Tensor<B, 2>,      // (N, 1)
    next_obs: Tensor<B, 2>,    // (N, obs_dim)
    done_mask: Tensor<B, 2>,   // (N, 1), 0 when done else 1
    old_prob: Tensor<B, 2>,    // (N, 1)
    len: usize,
}

fn stack_obs<'a>(rows: impl Iterator<Item = ArrayView1<'a, f32>>, n: usize, obs_dim: usize) -> Array2<f32> {
    let mut arr = Array2::<f32>::zeros((n, obs_dim));
    for (mut dst, src) in arr.rows_mut().into_iter().zip(rows) {
        assert_eq!(
            src.len(),
            obs_dim,
            "all observations of a batch must have the same length"
        );
        dst.assign(&src);
    }
    return arr;
}

impl<B: Backend> TransitionBatch<B> {
    pub fn from_transitions(transitions: &[Transition], device: &B::Device) -> Result<Self, PpoError> {
        let first = transitions.first().ok_or(PpoError::EmptyBatch)?;
        let n = transitions.len();
        let obs_dim = first.obs.len();

        let obs = stack_obs(transitions.iter().map(|t| t.obs.view()), n, obs_dim);
        let next_obs = stack_obs(transitions.iter().map(|t| t.next_obs.view()), n, obs_dim);
        let action: Vec<i64> = transitions.iter().map(|t| t.action as i64).collect();
        let reward: Vec<f32> = transitions.iter().map(|t| t.reward).collect();
        let done_mask: Vec<f32> = transitions
            .iter()
            .map(|t| if t.done { 0.0f32 } else { 1.0 })
            .collect();
        let old_prob: Vec<f32> = transitions.iter().map(|t| t.action_prob).collect();

        Ok(Self {
            obs: ndarray2tensor2(obs, device),
            action: vec2int_column(action, device),
            reward: vec2column(reward, device),
            next_obs: ndarray2tensor2(next_obs, device),
            done_mask: vec2column(done_mask, device),
            old_prob: vec2column(old_prob, device),
            len: n,
        })
    }

    pub fn obs(&self) -> &Tensor<B, 2> {
        &self.obs
    }

    pub fn action(&self) -> &Tensor<B, 2, Int> {
        &self.action
    }

    pub fn reward(&self) -> &Tensor<B, 2> {
        &self.reward
    }

    pub fn next_obs(&self) -> &Tensor<B, 2> {
        &self.next_obs
    }

    pub fn done_mask(&self) -> &Tensor<B, 2> {
        &self.done_mask
    }

    pub fn old_prob(&self) -> &Tensor<B, 2> {
        &self.old_prob
    }

    /// Number of transitions, never zero.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

use crate::burn_utils::distribution::categorical::PROB_EPSILON;
use crate::rl_algorithm::base::memory::TransitionBatch;
use crate::rl_algorithm::base::model::PolicyValueModel;
use crate::rl_algorithm::base::rl_utils::{
    self, compute_gae, tensor2scalar, tensor2vec, vec2column, EpochStats, UpdateInfo,
};
use crate::rl_algorithm::ppo::config::PpoConfig;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use log::{debug, trace, warn};
use std::marker::PhantomData;

/// Log importance ratios are clamped to this range before `exp`.
pub const MAX_LOG_RATIO: f32 = 20.0;

/// `reward + gamma * next_value` where `done_mask` is 1, plain `reward` where it
/// is 0, detached from the graph. A non-finite `next_value` never leaks into a
/// terminal target.
pub fn td_target<B: Backend>(
    reward: Tensor<B, 2>,
    next_value: Tensor<B, 2>,
    done_mask: Tensor<B, 2>,
    gamma: f32,
) -> Tensor<B, 2> {
    let bootstrap = next_value.mask_fill(done_mask.equal_elem(0.0), 0.0);
    return (reward + bootstrap * gamma).detach();
}

/// `new_prob / old_prob` with both sides floored at [`PROB_EPSILON`].
pub fn importance_ratio<B: Backend>(new_prob: Tensor<B, 2>, old_prob: Tensor<B, 2>) -> Tensor<B, 2> {
    let log_ratio = new_prob.clamp_min(PROB_EPSILON).log() - old_prob.clamp_min(PROB_EPSILON).log();
    return log_ratio.clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO).exp();
}

/// Element-wise `-min(ratio * A, clip(ratio, 1 - eps, 1 + eps) * A)`.
pub fn clipped_surrogate_loss<B: Backend>(
    ratio: Tensor<B, 2>,
    advantages: Tensor<B, 2>,
    epsilon_clip: f32,
) -> Tensor<B, 2> {
    let clipped_ratio = ratio.clone().clamp(1.0 - epsilon_clip, 1.0 + epsilon_clip);
    let now_advantage = ratio * advantages.clone();
    let clip_advantage = clipped_ratio * advantages;
    return now_advantage.min_pair(clip_advantage).neg();
}

/// Mean smooth-L1 (Huber, beta = 1) loss.
pub fn smooth_l1_loss<B: Backend>(pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let diff = (pred - target).abs();
    let quadratic = diff.clone().clamp_max(1.0);
    let linear = diff - quadratic.clone();
    return (quadratic.powf_scalar(2.0) * 0.5 + linear).mean();
}

/// Clipped-objective update engine.
///
/// Every call to [`PPO::train`] runs `update_epochs` full-batch gradient steps on
/// one drained rollout. Values, deltas and advantages are recomputed in every
/// epoch from the current parameters.
pub struct PPO<B: AutodiffBackend, M: PolicyValueModel<B>> {
    backend: PhantomData<B>,
    model: PhantomData<M>,
    updates: usize,
}

impl<B: AutodiffBackend, M: PolicyValueModel<B>> Default for PPO<B, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend, M: PolicyValueModel<B>> PPO<B, M> {
    pub fn new() -> Self {
        Self {
            backend: PhantomData,
            model: PhantomData,
            updates: 0,
        }
    }

    /// Number of `train` calls so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn train_epoch(
        model: M,
        batch: &TransitionBatch<B>,
        optimizer: &mut impl Optimizer<M, B>,
        config: &PpoConfig,
    ) -> (M, EpochStats) {
        let device = batch.obs().device();

        let (dist, values) = model.autodiff_forward(batch.obs().clone());
        let next_values = model.autodiff_value(batch.next_obs().clone()).detach();
        let target = td_target(
            batch.reward().clone(),
            next_values,
            batch.done_mask().clone(),
            config.gamma,
        );
        let delta = target.clone() - values.clone().detach();
        let advantages = compute_gae(&tensor2vec(&delta), config.gamma, config.gae_lambda);
        trace!("advantages={:?}", advantages);
        let advantages = vec2column::<B, f32>(advantages, &device);

        let new_prob = dist.prob_of(batch.action().clone());
        let ratio = importance_ratio(new_prob, batch.old_prob().clone());
        let policy_loss = clipped_surrogate_loss(ratio.clone(), advantages, config.epsilon_clip);
        let value_loss = smooth_l1_loss(values, target);
        let entropy = dist.entropy().mean();

        let loss = policy_loss.clone().mean() + value_loss.clone() - entropy.clone() * config.entropy_coef;

        let ratios = tensor2vec(&ratio.detach());
        let n = ratios.len().max(1) as f32;
        let stats = EpochStats {
            policy_loss: tensor2scalar(policy_loss.detach().mean()),
            value_loss: tensor2scalar(value_loss.detach()),
            entropy: tensor2scalar(entropy.detach()),
            approx_kl: ratios.iter().map(|r| (r - 1.0) - r.ln()).sum::<f32>() / n,
            clip_fraction: ratios
                .iter()
                .filter(|r| (*r - 1.0).abs() > config.epsilon_clip)
                .count() as f32
                / n,
        };
        if !tensor2scalar(loss.clone().detach()).is_finite() {
            warn!("non-finite PPO loss {:?}, stepping anyway", stats);
        }

        let model = rl_utils::update_parameters(loss, model, optimizer, config.learning_rate);
        return (model, stats);
    }

    pub fn train(
        &mut self,
        mut model: M,
        batch: &TransitionBatch<B>,
        optimizer: &mut impl Optimizer<M, B>,
        config: &PpoConfig,
    ) -> (M, UpdateInfo) {
        let mut update_info = UpdateInfo::new(batch.len());
        for epoch in 0..config.update_epochs {
            let (next_model, stats) = Self::train_epoch(model, batch, optimizer, config);
            model = next_model;
            trace!("epoch={} stats={:?}", epoch, stats);
            update_info.accumulate(&stats);
        }
        self.updates += 1;
        let update_info = update_info.finish();
        debug!("update={} info={:?}", self.updates, update_info);
        return (model, update_info);
    }
}

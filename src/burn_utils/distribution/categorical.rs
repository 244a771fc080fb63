use burn::prelude::*;
use burn::tensor::Int;
use log::warn;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

/// Lower bound applied to probabilities before taking a log or dividing.
pub const PROB_EPSILON: f32 = 1e-8;

/// Batch of categorical distributions, one row per observation.
#[derive(Debug, Clone)]
pub struct Categorical<B: Backend> {
    probs: Tensor<B, 2>, // (B, action_dim)
}

impl<B: Backend> Categorical<B> {
    pub fn new(probs: Tensor<B, 2>) -> Self {
        Self { probs }
    }

    pub fn probs(&self) -> Tensor<B, 2> {
        self.probs.clone()
    }

    // actions: (B, 1)
    pub fn prob_of(&self, actions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        self.probs.clone().gather(1, actions)
    }

    pub fn log_prob(&self, actions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        self.prob_of(actions).clamp_min(PROB_EPSILON).log()
    }

    /// Per-row entropy, shape (B).
    pub fn entropy(&self) -> Tensor<B, 1> {
        let log_probs = self.probs.clone().clamp_min(PROB_EPSILON).log();
        let per_row: Tensor<B, 2> = (self.probs.clone() * log_probs).sum_dim(1);
        return per_row.flatten::<1>(0, 1).neg();
    }

    /// Draws one action index per row.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let [batch_size, action_dim] = self.probs.dims();
        let values = self
            .probs
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_else(|_| vec![f32::NAN; batch_size * action_dim]);
        return values
            .chunks(action_dim)
            .map(|row| sample_index(row, rng))
            .collect();
    }
}

/// Draws an index in proportion to unnormalized weights.
///
/// Non-finite or negative weights count as zero. A row without any mass
/// falls back to a uniform draw so a collapsed policy keeps producing actions.
pub fn sample_index<R: Rng + ?Sized>(weights: &[f32], rng: &mut R) -> usize {
    assert!(!weights.is_empty(), "cannot sample from an empty action set");
    let clean = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 });
    match WeightedIndex::new(clean) {
        Ok(dist) => dist.sample(rng),
        Err(e) => {
            warn!(
                "degenerate action distribution {:?} ({}), sampling uniformly",
                weights, e
            );
            rng.random_range(0..weights.len())
        }
    }
}

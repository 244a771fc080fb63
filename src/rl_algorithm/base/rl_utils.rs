use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Element, Int, Tensor, TensorData};
use burn::LearningRate;

use ndarray::{Array1, Array2};
use num_traits::{ToPrimitive, Zero};

pub(crate) fn update_parameters<B: AutodiffBackend, M: AutodiffModule<B>>(
    loss: Tensor<B, 1>,
    module: M,
    optimizer: &mut impl Optimizer<M, B>,
    learning_rate: LearningRate,
) -> M {
    let gradients = loss.backward();
    let gradient_params = GradientsParams::from_grads(gradients, &module);
    optimizer.step(learning_rate, module, gradient_params)
}

/// Losses and diagnostics of one update, averaged over its epochs.
#[derive(Debug, Clone, Default)]
pub struct UpdateInfo {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
    pub batch_size: usize,
    pub epochs: usize,
}

impl UpdateInfo {
    pub fn new(batch_size: usize) -> Self {
        return Self {
            batch_size,
            ..Default::default()
        };
    }

    pub(crate) fn accumulate(&mut self, other: &EpochStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.entropy += other.entropy;
        self.approx_kl += other.approx_kl;
        self.clip_fraction += other.clip_fraction;
        self.epochs += 1;
    }

    pub(crate) fn finish(mut self) -> Self {
        if self.epochs > 0 {
            let n = self.epochs as f32;
            self.policy_loss /= n;
            self.value_loss /= n;
            self.entropy /= n;
            self.approx_kl /= n;
            self.clip_fraction /= n;
        }
        return self;
    }

    pub fn is_finite(&self) -> bool {
        self.policy_loss.is_finite() && self.value_loss.is_finite() && self.entropy.is_finite()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EpochStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
}

/// Generalized advantage estimation over one chronologically ordered segment.
///
/// `advantage[n-1] = delta[n-1]` and
/// `advantage[t] = delta[t] + gamma * lambda * advantage[t+1]`.
pub fn compute_gae(deltas: &[f32], gamma: f32, gae_lambda: f32) -> Vec<f32> {
    let mut advantages = vec![0.0f32; deltas.len()];
    let mut running_advantage = 0.0f32;
    for t in (0..deltas.len()).rev() {
        running_advantage = deltas[t] + gamma * gae_lambda * running_advantage;
        advantages[t] = running_advantage;
    }
    return advantages;
}

pub fn vec2tensor1<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Vec<T>,
    device: &B::Device,
) -> Tensor<B, 1> {
    let shape = [arr.len()];
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 1>::from_data(tensor_data, device);
}

/// Column vector `(n, 1)`.
pub fn vec2column<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Vec<T>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let shape = [arr.len(), 1];
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 2>::from_data(tensor_data, device);
}

pub fn vec2int_column<B: Backend>(arr: Vec<i64>, device: &B::Device) -> Tensor<B, 2, Int> {
    let shape = [arr.len(), 1];
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 2, Int>::from_data(tensor_data, device);
}

pub fn ndarray2tensor1<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Array1<T>,
    device: &B::Device,
) -> Tensor<B, 1> {
    let shape = arr.shape().to_vec();
    let vec = arr.into_raw_vec_and_offset().0;
    let tensor_data = TensorData::new(vec, shape);
    return Tensor::<B, 1>::from_data(tensor_data, device);
}

pub fn ndarray2tensor2<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Array2<T>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let shape = arr.shape().to_vec();
    let vec = arr.into_raw_vec_and_offset().0;
    let tensor_data = TensorData::new(vec, shape);
    return Tensor::<B, 2>::from_data(tensor_data, device);
}

pub fn tensor2vec<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Vec<f32> {
    return tensor
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default();
}

pub fn tensor2scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    return tensor2vec(&tensor).first().copied().unwrap_or(f32::NAN);
}

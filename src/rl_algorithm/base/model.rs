use crate::burn_utils::distribution::Categorical;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

// for predicting the action distribution and the value of states
pub trait PolicyValueModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Policy and value with gradient tracking, used by the update engine.
    fn autodiff_forward(&self, input: Tensor<B, 2>) -> (Categorical<B>, Tensor<B, 2>);

    /// Policy and value without a graph, used for action selection.
    fn eval_forward(
        &self,
        input: Tensor<B::InnerBackend, 2>,
    ) -> (Categorical<B::InnerBackend>, Tensor<B::InnerBackend, 2>);

    fn autodiff_value(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    fn get_obs_dim(&self) -> usize;

    fn get_action_dim(&self) -> usize;
}

use crate::burn_utils::distribution::Categorical;
use crate::burn_utils::{build_relu_trunk, Sequence};
use crate::rl_algorithm::base::model::PolicyValueModel;
use burn::module::AutodiffModule;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};

/// Shared ReLU trunk with a softmax policy head and a scalar value head.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    trunk: Sequence<B>,
    fc_pi: Linear<B>,
    fc_v: Linear<B>,
    obs_dim: usize,
    action_dim: usize,
}

impl<B: Backend> ActorCritic<B> {
    fn hidden(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [_, obs_dim] = input.dims();
        assert_eq!(
            obs_dim, self.obs_dim,
            "observation has {} features, network expects {}",
            obs_dim, self.obs_dim
        );
        return self.trunk.forward(input);
    }

    /// Action probabilities, shape (B, action_dim). Every row sums to one.
    pub fn pi(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = self.fc_pi.forward(self.hidden(input));
        return softmax(logits, 1);
    }

    /// State values, shape (B, 1).
    pub fn v(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        return self.fc_v.forward(self.hidden(input));
    }

    /// Both heads from a single trunk pass.
    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let hidden = self.hidden(input);
        let probs = softmax(self.fc_pi.forward(hidden.clone()), 1);
        let values = self.fc_v.forward(hidden);
        return (probs, values);
    }

    /// Action probabilities for one observation, shape (action_dim).
    pub fn pi_single(&self, input: Tensor<B, 1>) -> Tensor<B, 1> {
        let probs = self.pi(input.unsqueeze_dim::<2>(0));
        return probs.flatten::<1>(0, 1);
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }
}

impl<B: AutodiffBackend> PolicyValueModel<B> for ActorCritic<B> {
    fn autodiff_forward(&self, input: Tensor<B, 2>) -> (Categorical<B>, Tensor<B, 2>) {
        let (probs, values) = self.forward(input);
        return (Categorical::new(probs), values);
    }

    fn eval_forward(
        &self,
        input: Tensor<B::InnerBackend, 2>,
    ) -> (Categorical<B::InnerBackend>, Tensor<B::InnerBackend, 2>) {
        let (probs, values) = self.valid().forward(input);
        return (Categorical::new(probs), values);
    }

    fn autodiff_value(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        return self.v(input);
    }

    fn get_obs_dim(&self) -> usize {
        self.obs_dim
    }

    fn get_action_dim(&self) -> usize {
        self.action_dim
    }
}

#[derive(Config, Debug)]
pub struct ActorCriticConfig {
    obs_dim: usize,
    action_dim: usize,
    #[config(default = "vec![256, 128]")]
    hidden_dims: Vec<usize>,
}

impl ActorCriticConfig {
    /// Returns the initialized network on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        assert!(self.obs_dim > 0 && self.action_dim > 0);
        assert!(!self.hidden_dims.is_empty(), "at least one hidden stage");
        let trunk = build_relu_trunk(self.obs_dim, &self.hidden_dims, device);
        let last = self.hidden_dims[self.hidden_dims.len() - 1];
        let fc_pi = LinearConfig::new(last, self.action_dim).init(device);
        let fc_v = LinearConfig::new(last, 1).init(device);
        return ActorCritic {
            trunk,
            fc_pi,
            fc_v,
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
        };
    }
}

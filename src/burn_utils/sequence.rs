use burn::{
    nn::{Linear, LinearConfig, Relu},
    prelude::*,
};

#[derive(Module, Debug)]
pub enum BurnForwarder<B: Backend> {
    Linear(Linear<B>),
    Relu(Relu),
}

#[derive(Module, Debug)]
pub struct Sequence<B: Backend> {
    forwarder_vec: Vec<BurnForwarder<B>>,
}

impl<B: Backend> Sequence<B> {
    pub fn push(&mut self, forwarder: BurnForwarder<B>) {
        self.forwarder_vec.push(forwarder);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.forwarder_vec.len()
    }

    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut out = input;
        for forwarder in &self.forwarder_vec {
            out = match forwarder {
                BurnForwarder::Linear(linear) => linear.forward(out),
                BurnForwarder::Relu(relu) => relu.forward(out),
            }
        }
        return out;
    }
}

/// Stack of `Linear -> ReLU` stages, one per entry of `layer_dims`.
///
/// There is no output projection; heads are attached by the caller.
pub fn build_relu_trunk<B: Backend>(
    input_size: usize,
    layer_dims: &[usize],
    device: &B::Device,
) -> Sequence<B> {
    let mut seq: Sequence<B> = Sequence {
        forwarder_vec: Vec::with_capacity(layer_dims.len() * 2),
    };
    let mut in_size = input_size;
    for hidden_dim in layer_dims {
        seq.push(BurnForwarder::Linear(
            LinearConfig::new(in_size, *hidden_dim).init(device),
        ));
        seq.push(BurnForwarder::Relu(Relu::new()));
        in_size = *hidden_dim;
    }
    return seq;
}

//! Focal loss, as proposed in "Focal Loss for Dense Object Detection".
//!
//! `Loss(x, class) = -(1 - softmax(x)[class])^gamma * log_softmax(x)[class]`
//!
//! `gamma > 0` reduces the relative loss for well-classified voxels
//! (p > 0.5), putting more focus on hard, misclassified ones.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{activation, backend::Backend, Int, Tensor, TensorData},
};

use super::cross_entropy::voxel_nll;

/// Configuration for [`FocalLoss`].
#[derive(Config, Debug)]
pub struct FocalLossConfig {
    /// A manual rescaling weight given to each class.
    pub weight: Option<Vec<f32>>,
    #[config(default = 2.0)]
    pub gamma: f64,
    #[config(default = -100)]
    pub ignore_index: i64,
}

/// Focal loss over raw logits and integer labels.
#[derive(Debug, Clone)]
pub struct FocalLoss<B: Backend> {
    weight: Option<Vec<f32>>,
    gamma: f64,
    ignore_index: i64,
    _phantom: PhantomData<B>,
}

impl FocalLossConfig {
    /// Initialize a new focal loss with the given configuration.
    pub fn init<B: Backend>(&self) -> FocalLoss<B> {
        FocalLoss {
            weight: self.weight.clone(),
            gamma: self.gamma,
            ignore_index: self.ignore_index,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for FocalLoss<B> {
    fn default() -> Self {
        FocalLossConfig::new().init()
    }
}

impl<B: Backend> FocalLoss<B> {
    /// Calculate the focal loss, averaged across observations.
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let probs = activation::softmax(input.clone(), 1);
        let log_probs = activation::log_softmax(input, 1);

        let focal = (Tensor::ones_like(&probs) - probs).powf_scalar(self.gamma) * log_probs;

        let weight = self.weight.as_ref().map(|w| {
            Tensor::from_data(TensorData::new(w.clone(), [w.len()]), &focal.device())
        });
        voxel_nll(focal, target, weight, self.ignore_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;

    type Backend = NdArray<f32>;

    #[test]
    fn test_gamma_zero_reduces_to_cross_entropy() {
        let device = Default::default();
        let input = Tensor::<Backend, 5>::random(
            [1, 3, 1, 2, 2],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let target = Tensor::<Backend, 4, Int>::from_ints([[[[0, 1], [2, 1]]]], &device);

        let focal = FocalLossConfig::new()
            .with_gamma(0.0)
            .init::<Backend>()
            .forward(input.clone(), target.clone())
            .into_scalar()
            .to_f64();
        let ce = crate::losses::CrossEntropyLoss3dConfig::new()
            .init::<Backend>()
            .forward(input, target)
            .into_scalar()
            .to_f64();

        assert!((focal - ce).abs() < 1e-5, "focal = {focal}, ce = {ce}");
    }

    #[test]
    fn test_gamma_down_weights_easy_examples() {
        let device = Default::default();
        // Confident, correct prediction: the focal term should shrink
        // the already-small loss further.
        let input = Tensor::<Backend, 1>::from_floats([4.0, -4.0], &device)
            .reshape([1, 2, 1, 1, 1]);
        let target = Tensor::<Backend, 4, Int>::zeros([1, 1, 1, 1], &device);

        let plain = FocalLossConfig::new()
            .with_gamma(0.0)
            .init::<Backend>()
            .forward(input.clone(), target.clone())
            .into_scalar()
            .to_f64();
        let focused = FocalLossConfig::new()
            .with_gamma(2.0)
            .init::<Backend>()
            .forward(input, target)
            .into_scalar()
            .to_f64();

        assert!(focused < plain, "focused = {focused}, plain = {plain}");
    }
}

//! Generalized Dice Loss (GDL) as described in
//! <https://arxiv.org/pdf/1707.03237.pdf>.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor, TensorData},
};

use super::{utils::flatten, Normalization};

/// Configuration for [`GeneralizedDiceLoss`].
#[derive(Config, Debug)]
pub struct GeneralizedDiceLossConfig {
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Optional per-channel weights applied to the intersection term.
    pub weight: Option<Vec<f32>>,
    pub ignore_index: Option<i64>,
    #[config(default = "Normalization::Sigmoid")]
    pub normalization: Normalization,
}

/// Generalized Dice loss with per-class `1 / sum(target)^2` weighting,
/// which down-weights large/common classes.
#[derive(Debug, Clone)]
pub struct GeneralizedDiceLoss<B: Backend> {
    epsilon: f64,
    weight: Option<Vec<f32>>,
    ignore_index: Option<i64>,
    normalization: Normalization,
    _phantom: PhantomData<B>,
}

impl GeneralizedDiceLossConfig {
    /// Initialize a new generalized Dice loss with the given configuration.
    pub fn init<B: Backend>(&self) -> GeneralizedDiceLoss<B> {
        GeneralizedDiceLoss {
            epsilon: self.epsilon,
            weight: self.weight.clone(),
            ignore_index: self.ignore_index,
            normalization: self.normalization.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for GeneralizedDiceLoss<B> {
    fn default() -> Self {
        GeneralizedDiceLossConfig::new().init()
    }
}

impl<B: Backend> GeneralizedDiceLoss<B> {
    /// Calculate the generalized Dice loss.
    ///
    /// # Panics
    ///
    /// Panics if `input` and `target` do not have the same shape.
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        // get probabilities from logits
        let input = self.normalization.apply(input);

        assert_eq!(
            input.shape(),
            target.shape(),
            "'input' and 'target' must have the same shape. Got input: {:?}, target: {:?}",
            input.shape(),
            target.shape()
        );

        // mask ignore_index if present
        let (input, target) = match self.ignore_index {
            Some(ignore) => {
                let mask = target.clone().not_equal_elem(ignore).float();
                (input * mask.clone(), target * mask)
            }
            None => (input, target),
        };

        let input = flatten(input);
        let target = flatten(target);

        let target_sum = target.clone().sum_dim(1).squeeze::<1>(1);
        let class_weights = (target_sum.clone() * target_sum)
            .clamp_min(self.epsilon)
            .recip();

        let mut intersect = (input.clone() * target.clone()).sum_dim(1).squeeze::<1>(1)
            * class_weights.clone();
        if let Some(weight) = &self.weight {
            let weight: Tensor<B, 1> = Tensor::from_data(
                TensorData::new(weight.clone(), [weight.len()]),
                &intersect.device(),
            );
            intersect = weight * intersect;
        }

        let denominator = input.sum_dim(1).squeeze::<1>(1) * class_weights
            + target.sum_dim(1).squeeze::<1>(1);

        let dice = intersect.mul_scalar(2.0) / denominator.clamp_min(self.epsilon);
        (Tensor::ones_like(&dice) - dice).mean()
    }

    pub(crate) const fn ignore_index(&self) -> Option<i64> {
        self.ignore_index
    }
}

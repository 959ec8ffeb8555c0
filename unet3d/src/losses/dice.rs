//! Dice coefficient and Dice loss.
//!
//! Generalized to multiple channels by computing per-channel Dice scores
//! (as described in <https://arxiv.org/pdf/1707.03237.pdf>) and averaging
//! across channels.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor, TensorData},
};

use super::{utils::flatten, Normalization};

/// Computes the per-channel Dice coefficient between two prediction-shaped
/// tensors.
///
/// Assumes the input is a normalized probability. If `ignore_index` is
/// given, both tensors are zeroed wherever the target equals the sentinel
/// before scoring. An optional per-channel `weight` multiplies the
/// intersection term only, not the denominator; this is the asymmetry
/// of the Generalized Dice formulation, preserved as-is.
///
/// # Panics
///
/// Panics if `input` and `target` do not have the same shape.
pub fn compute_per_channel_dice<B: Backend>(
    input: Tensor<B, 5>,
    target: Tensor<B, 5>,
    epsilon: f64,
    ignore_index: Option<i64>,
    weight: Option<Tensor<B, 1>>,
) -> Tensor<B, 1> {
    assert_eq!(
        input.shape(),
        target.shape(),
        "'input' and 'target' must have the same shape. Got input: {:?}, target: {:?}",
        input.shape(),
        target.shape()
    );

    // mask ignore_index if present
    let (input, target) = match ignore_index {
        Some(ignore) => {
            let mask = target.clone().not_equal_elem(ignore).float();
            (input * mask.clone(), target * mask)
        }
        None => (input, target),
    };

    let input = flatten(input);
    let target = flatten(target);

    let mut intersect = (input.clone() * target.clone()).sum_dim(1).squeeze::<1>(1);
    if let Some(weight) = weight {
        intersect = weight * intersect;
    }

    let denominator = (input + target).sum_dim(1).squeeze::<1>(1);
    intersect.mul_scalar(2.0) / denominator.clamp_min(epsilon)
}

/// Configuration for [`DiceCoefficient`].
#[derive(Config, Debug)]
pub struct DiceCoefficientConfig {
    #[config(default = 1e-5)]
    pub epsilon: f64,
    pub ignore_index: Option<i64>,
}

/// Mean Dice coefficient across channels.
///
/// Input is expected to be probabilities instead of logits.
#[derive(Debug, Clone)]
pub struct DiceCoefficient<B: Backend> {
    epsilon: f64,
    ignore_index: Option<i64>,
    _phantom: PhantomData<B>,
}

impl DiceCoefficientConfig {
    /// Initialize a new Dice coefficient metric with the given configuration.
    pub const fn init<B: Backend>(&self) -> DiceCoefficient<B> {
        DiceCoefficient {
            epsilon: self.epsilon,
            ignore_index: self.ignore_index,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceCoefficient<B> {
    fn default() -> Self {
        DiceCoefficientConfig::new().init()
    }
}

impl<B: Backend> DiceCoefficient<B> {
    /// Average Dice score across all channels.
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        compute_per_channel_dice(input, target, self.epsilon, self.ignore_index, None).mean()
    }
}

/// Configuration for [`DiceLoss`].
#[derive(Config, Debug)]
pub struct DiceLossConfig {
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Optional per-channel weights applied to the intersection term.
    pub weight: Option<Vec<f32>>,
    pub ignore_index: Option<i64>,
    /// The loss is applied to the model output as given; set a
    /// normalization explicitly to score probabilities instead.
    #[config(default = "Normalization::None")]
    pub normalization: Normalization,
}

/// Dice loss: `mean(1 - per_channel_dice)`.
///
/// Additionally allows per-channel weights to be provided.
#[derive(Debug, Clone)]
pub struct DiceLoss<B: Backend> {
    epsilon: f64,
    weight: Option<Vec<f32>>,
    ignore_index: Option<i64>,
    normalization: Normalization,
    _phantom: PhantomData<B>,
}

impl DiceLossConfig {
    /// Initialize a new Dice loss with the given configuration.
    pub fn init<B: Backend>(&self) -> DiceLoss<B> {
        DiceLoss {
            epsilon: self.epsilon,
            weight: self.weight.clone(),
            ignore_index: self.ignore_index,
            normalization: self.normalization.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for DiceLoss<B> {
    fn default() -> Self {
        DiceLossConfig::new().init()
    }
}

impl<B: Backend> DiceLoss<B> {
    /// Calculate the Dice loss.
    ///
    /// # Arguments
    /// * `input` - Prediction with shape `[N, C, D, H, W]`
    /// * `target` - Ground truth mask with the same shape
    ///
    /// # Returns
    /// Scalar loss tensor
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        let input = self.normalization.apply(input);
        let weight = self.weight.as_ref().map(|w| {
            Tensor::from_data(TensorData::new(w.clone(), [w.len()]), &target.device())
        });

        let per_channel_dice =
            compute_per_channel_dice(input, target, self.epsilon, self.ignore_index, weight);
        // Average the Dice score across all channels/classes
        (Tensor::ones_like(&per_channel_dice) - per_channel_dice).mean()
    }

    pub(crate) const fn ignore_index(&self) -> Option<i64> {
        self.ignore_index
    }
}

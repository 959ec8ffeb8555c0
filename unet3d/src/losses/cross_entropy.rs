//! Voxel-wise cross-entropy losses over `(N, C, D, H, W)` logits.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{activation, backend::Backend, Int, Tensor, TensorData},
};

use super::utils::flatten;

/// The default sentinel of the cross-entropy family, excluded from both
/// the loss and its normalization.
pub const DEFAULT_IGNORE_INDEX: i64 = -100;

/// Negative log-likelihood over per-voxel log-probabilities.
///
/// `log_probs` has shape `(N, C, D, H, W)`, `target` holds one class
/// label per voxel. Voxels whose label equals `ignore_index` contribute
/// nothing; with class `weight`s the result is normalized by the weight
/// sum of the remaining voxels, matching the usual weighted-mean
/// cross-entropy convention.
pub(crate) fn voxel_nll<B: Backend>(
    log_probs: Tensor<B, 5>,
    target: Tensor<B, 4, Int>,
    weight: Option<Tensor<B, 1>>,
    ignore_index: i64,
) -> Tensor<B, 1> {
    let [n, _, d, h, w] = log_probs.dims();
    assert_eq!(
        [n, d, h, w],
        target.dims(),
        "'input' and 'target' batch/spatial shapes must match. Got input: {:?}, target: {:?}",
        log_probs.dims(),
        target.dims()
    );

    let m = n * d * h * w;
    let log_probs = flatten(log_probs);
    let labels = target.reshape([m]);

    let valid = labels.clone().not_equal_elem(ignore_index);
    // Clamp ignored labels to class 0 so the gather stays in bounds.
    let safe_labels = labels.mask_fill(valid.clone().bool_not(), 0);

    let picked = log_probs
        .gather(0, safe_labels.clone().unsqueeze_dim::<2>(0))
        .squeeze::<1>(0);

    let valid = valid.float();
    let voxel_weight = match weight {
        Some(weight) => weight.gather(0, safe_labels) * valid,
        None => valid,
    };

    (picked * voxel_weight.clone()).sum().neg() / voxel_weight.sum().clamp_min(f64::EPSILON)
}

/// Configuration for [`CrossEntropyLoss3d`].
#[derive(Config, Debug)]
pub struct CrossEntropyLoss3dConfig {
    /// A manual rescaling weight given to each class.
    pub weight: Option<Vec<f32>>,
    #[config(default = -100)]
    pub ignore_index: i64,
}

/// Voxel-wise cross-entropy over raw logits and integer labels.
#[derive(Debug, Clone)]
pub struct CrossEntropyLoss3d<B: Backend> {
    weight: Option<Vec<f32>>,
    ignore_index: i64,
    _phantom: PhantomData<B>,
}

impl CrossEntropyLoss3dConfig {
    /// Initialize a new cross-entropy loss with the given configuration.
    pub fn init<B: Backend>(&self) -> CrossEntropyLoss3d<B> {
        CrossEntropyLoss3d {
            weight: self.weight.clone(),
            ignore_index: self.ignore_index,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for CrossEntropyLoss3d<B> {
    fn default() -> Self {
        CrossEntropyLoss3dConfig::new().init()
    }
}

impl<B: Backend> CrossEntropyLoss3d<B> {
    /// Calculate the cross-entropy loss.
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let weight = self.weight.as_ref().map(|w| {
            Tensor::from_data(TensorData::new(w.clone(), [w.len()]), &input.device())
        });
        let log_probs = activation::log_softmax(input, 1);
        voxel_nll(log_probs, target, weight, self.ignore_index)
    }
}

/// Configuration for [`WeightedCrossEntropyLoss`].
#[derive(Config, Debug)]
pub struct WeightedCrossEntropyLossConfig {
    /// A manual rescaling weight multiplied into the derived class weights.
    pub weight: Option<Vec<f32>>,
    #[config(default = -100)]
    pub ignore_index: i64,
}

/// Weighted cross-entropy (WCE) as described in
/// <https://arxiv.org/pdf/1707.03237.pdf>.
///
/// Per-class weights are derived from the input itself as
/// `sum(1 - p) / sum(p)` over the softmax-normalized flattened input, a
/// class-balance heuristic that up-weights rare classes.
#[derive(Debug, Clone)]
pub struct WeightedCrossEntropyLoss<B: Backend> {
    weight: Option<Vec<f32>>,
    ignore_index: i64,
    _phantom: PhantomData<B>,
}

impl WeightedCrossEntropyLossConfig {
    /// Initialize a new weighted cross-entropy loss with the given configuration.
    pub fn init<B: Backend>(&self) -> WeightedCrossEntropyLoss<B> {
        WeightedCrossEntropyLoss {
            weight: self.weight.clone(),
            ignore_index: self.ignore_index,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for WeightedCrossEntropyLoss<B> {
    fn default() -> Self {
        WeightedCrossEntropyLossConfig::new().init()
    }
}

impl<B: Backend> WeightedCrossEntropyLoss<B> {
    /// Calculate the weighted cross-entropy loss.
    pub fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        let mut class_weights = Self::class_weights(input.clone());
        if let Some(weight) = &self.weight {
            let weight: Tensor<B, 1> = Tensor::from_data(
                TensorData::new(weight.clone(), [weight.len()]),
                &input.device(),
            );
            class_weights = class_weights * weight;
        }

        let log_probs = activation::log_softmax(input, 1);
        voxel_nll(log_probs, target, Some(class_weights), self.ignore_index)
    }

    fn class_weights(input: Tensor<B, 5>) -> Tensor<B, 1> {
        // normalize the input first
        let flattened = flatten(activation::softmax(input, 1));
        let nominator = (Tensor::ones_like(&flattened) - flattened.clone())
            .sum_dim(1)
            .squeeze::<1>(1);
        let denominator = flattened.sum_dim(1).squeeze::<1>(1);
        nominator / denominator
    }
}

//! Loss functions for 3D segmentation training.
//!
//! This module implements the loss family used to train the UNet-3D
//! variant: Dice, Generalized Dice, cross-entropy (plain, weighted and
//! pixel-wise), focal and entropy losses, plus the ignore-index wrapper
//! and the criterion factory that maps a configuration name to a concrete
//! loss instance.

pub mod bce;
pub mod cross_entropy;
pub mod dice;
pub mod entropy;
pub mod factory;
pub mod focal;
pub mod generalized_dice;
pub mod ignore_index;
pub mod pixel;
pub mod target;
pub mod utils;

// Re-export loss functions and their configs
pub use bce::{BceWithLogitsLoss, BceWithLogitsLossConfig};
pub use cross_entropy::{
    CrossEntropyLoss3d, CrossEntropyLoss3dConfig, WeightedCrossEntropyLoss,
    WeightedCrossEntropyLossConfig,
};
pub use dice::{compute_per_channel_dice, DiceCoefficient, DiceCoefficientConfig, DiceLoss,
    DiceLossConfig};
pub use entropy::{EntropyLoss, EntropyLossConfig};
pub use factory::{get_loss_criterion, Criterion, LossKind, SUPPORTED_LOSSES};
pub use focal::{FocalLoss, FocalLossConfig};
pub use generalized_dice::{GeneralizedDiceLoss, GeneralizedDiceLossConfig};
pub use ignore_index::{DenseLoss, IgnoreIndexLossWrapper};
pub use pixel::{PixelWiseCrossEntropyLoss, PixelWiseCrossEntropyLossConfig};
pub use target::SegTarget;
pub use utils::{expand_as_one_hot, flatten};

use burn::{
    prelude::*,
    tensor::{activation, backend::Backend, Tensor},
};

/// How raw network output is turned into probabilities before scoring.
///
/// Soft Dice is usually applied to binary data, so sigmoid is the common
/// choice even for multi-class problems; softmax yields a proper
/// per-voxel distribution over channels instead.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Normalization {
    /// Use the network output as given.
    None,
    /// Channel-wise sigmoid.
    Sigmoid,
    /// Softmax over the channel axis.
    Softmax,
}

impl Normalization {
    /// Applies the normalization to a `(N, C, ...)` tensor.
    pub fn apply<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::None => input,
            Self::Sigmoid => activation::sigmoid(input),
            Self::Softmax => activation::softmax(input, 1),
        }
    }
}

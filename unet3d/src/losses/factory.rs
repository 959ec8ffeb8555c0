//! Criterion factory.
//!
//! Maps a configuration name, optional class weights and optional
//! ignore index to a concrete loss instance. Name dispatch happens
//! exactly once here; the returned [`Criterion`] is a closed set of
//! variants matched exhaustively at evaluation time.

use core::str::FromStr;

use burn::tensor::{backend::Backend, Tensor};

use super::{
    BceWithLogitsLoss, BceWithLogitsLossConfig, CrossEntropyLoss3d, CrossEntropyLoss3dConfig,
    DiceLoss, DiceLossConfig, EntropyLoss, EntropyLossConfig, FocalLoss, FocalLossConfig,
    GeneralizedDiceLoss, GeneralizedDiceLossConfig, IgnoreIndexLossWrapper,
    PixelWiseCrossEntropyLoss, PixelWiseCrossEntropyLossConfig, SegTarget,
    WeightedCrossEntropyLoss, WeightedCrossEntropyLossConfig,
};
use crate::error::{UNet3DError, UNet3DResult};

/// The loss names accepted by [`get_loss_criterion`].
pub const SUPPORTED_LOSSES: [&str; 8] = [
    "ce",
    "bce",
    "wce",
    "pce",
    "dice",
    "gdl",
    "EntropyLoss",
    "focal",
];

/// The closed set of supported losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    Bce,
    WeightedCrossEntropy,
    PixelWiseCrossEntropy,
    Dice,
    GeneralizedDice,
    Entropy,
    Focal,
}

impl FromStr for LossKind {
    type Err = UNet3DError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ce" => Ok(Self::CrossEntropy),
            "bce" => Ok(Self::Bce),
            "wce" => Ok(Self::WeightedCrossEntropy),
            "pce" => Ok(Self::PixelWiseCrossEntropy),
            "dice" => Ok(Self::Dice),
            "gdl" => Ok(Self::GeneralizedDice),
            "EntropyLoss" => Ok(Self::Entropy),
            "focal" => Ok(Self::Focal),
            _ => Err(UNet3DError::UnsupportedLoss {
                name: s.to_string(),
            }),
        }
    }
}

/// A configured loss criterion.
///
/// One variant per supported loss; each carries its own immutable
/// configuration and a pure evaluation, so the trainer's hot loop never
/// touches a string.
#[derive(Debug, Clone)]
pub enum Criterion<B: Backend> {
    CrossEntropy(CrossEntropyLoss3d<B>),
    Bce(BceWithLogitsLoss<B>),
    WrappedBce(IgnoreIndexLossWrapper<BceWithLogitsLoss<B>>),
    WeightedCrossEntropy(WeightedCrossEntropyLoss<B>),
    PixelWiseCrossEntropy(PixelWiseCrossEntropyLoss<B>),
    Dice(DiceLoss<B>),
    GeneralizedDice(GeneralizedDiceLoss<B>),
    Entropy(EntropyLoss<B>),
    Focal(FocalLoss<B>),
}

impl<B: Backend> Criterion<B> {
    /// Evaluate the criterion on a prediction and a batch target.
    ///
    /// The cross-entropy family requires label targets, the pixel-wise
    /// variant additionally requires a weight map, and the dense losses
    /// expand label targets to one-hot form. Handing an incompatible
    /// target form fails fast at this call site.
    pub fn forward(&self, input: Tensor<B, 5>, target: &SegTarget<B>) -> Tensor<B, 1> {
        let num_classes = input.dims()[1];
        match self {
            Self::CrossEntropy(loss) => loss.forward(input, target.labels()),
            Self::WeightedCrossEntropy(loss) => loss.forward(input, target.labels()),
            Self::Focal(loss) => loss.forward(input, target.labels()),
            Self::PixelWiseCrossEntropy(loss) => match target {
                SegTarget::WeightedLabels { labels, weights } => {
                    loss.forward(input, labels.clone(), weights.clone())
                }
                _ => panic!(
                    "the pixel-wise cross-entropy requires a target with a per-voxel weight map"
                ),
            },
            Self::Bce(loss) => loss.forward(input, target.to_mask(num_classes, None)),
            Self::WrappedBce(wrapper) => {
                let mask = target.to_mask(num_classes, Some(wrapper.ignore_index()));
                wrapper.forward(input, mask)
            }
            Self::Dice(loss) => {
                let mask = target.to_mask(num_classes, loss.ignore_index());
                loss.forward(input, mask)
            }
            Self::GeneralizedDice(loss) => {
                let mask = target.to_mask(num_classes, loss.ignore_index());
                loss.forward(input, mask)
            }
            Self::Entropy(loss) => loss.forward(input),
        }
    }
}

/// Returns the loss criterion named by `name`.
///
/// # Arguments
/// * `name` - one of [`SUPPORTED_LOSSES`]
/// * `weight` - a manual rescaling weight given to each class
/// * `ignore_index` - target value that is excluded from the loss
///
/// For `ce`/`wce` with no explicit ignore index, the cross-entropy
/// default sentinel (-100) is substituted. `bce` with an ignore index
/// is wrapped in [`IgnoreIndexLossWrapper`].
///
/// # Errors
///
/// Fails with [`UNet3DError::UnsupportedLoss`] for names outside the
/// supported set.
pub fn get_loss_criterion<B: Backend>(
    name: &str,
    weight: Option<Vec<f32>>,
    ignore_index: Option<i64>,
) -> UNet3DResult<Criterion<B>> {
    let kind = LossKind::from_str(name)?;

    let criterion = match kind {
        LossKind::Bce => match ignore_index {
            None => Criterion::Bce(BceWithLogitsLossConfig::new().init()),
            Some(ignore) => Criterion::WrappedBce(IgnoreIndexLossWrapper::new::<B>(
                BceWithLogitsLossConfig::new().init(),
                ignore,
            )?),
        },
        LossKind::CrossEntropy => Criterion::CrossEntropy(
            CrossEntropyLoss3dConfig::new()
                .with_weight(weight)
                .with_ignore_index(ignore_index.unwrap_or(super::cross_entropy::DEFAULT_IGNORE_INDEX))
                .init(),
        ),
        LossKind::WeightedCrossEntropy => Criterion::WeightedCrossEntropy(
            WeightedCrossEntropyLossConfig::new()
                .with_weight(weight)
                .with_ignore_index(ignore_index.unwrap_or(super::cross_entropy::DEFAULT_IGNORE_INDEX))
                .init(),
        ),
        LossKind::PixelWiseCrossEntropy => Criterion::PixelWiseCrossEntropy(
            PixelWiseCrossEntropyLossConfig::new()
                .with_class_weights(weight)
                .with_ignore_index(ignore_index)
                .init(),
        ),
        LossKind::GeneralizedDice => Criterion::GeneralizedDice(
            GeneralizedDiceLossConfig::new()
                .with_weight(weight)
                .with_ignore_index(ignore_index)
                .init(),
        ),
        LossKind::Dice => Criterion::Dice(
            DiceLossConfig::new()
                .with_weight(weight)
                .with_ignore_index(ignore_index)
                .init(),
        ),
        LossKind::Focal => Criterion::Focal(
            FocalLossConfig::new()
                .with_weight(weight)
                .with_ignore_index(ignore_index.unwrap_or(super::cross_entropy::DEFAULT_IGNORE_INDEX))
                .init(),
        ),
        LossKind::Entropy => Criterion::Entropy(EntropyLossConfig::new().init()),
    };

    Ok(criterion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;
    use burn::tensor::Int;

    type Backend = NdArray<f32>;

    #[test]
    fn test_rejects_unknown_loss_name() {
        let result = get_loss_criterion::<Backend>("bogus", None, None);
        assert!(matches!(
            result,
            Err(UNet3DError::UnsupportedLoss { name }) if name == "bogus"
        ));
    }

    #[test]
    fn test_every_supported_name_resolves() {
        for name in SUPPORTED_LOSSES {
            assert!(
                get_loss_criterion::<Backend>(name, None, None).is_ok(),
                "{name} should resolve"
            );
        }
    }

    #[test]
    fn test_bce_with_ignore_index_is_wrapped() {
        let criterion = get_loss_criterion::<Backend>("bce", None, Some(5)).unwrap();
        match criterion {
            Criterion::WrappedBce(wrapper) => assert_eq!(wrapper.ignore_index(), 5),
            other => panic!("expected a wrapped bce, got {other:?}"),
        }
    }

    #[test]
    fn test_bce_without_ignore_index_is_bare() {
        let criterion = get_loss_criterion::<Backend>("bce", None, None).unwrap();
        assert!(matches!(criterion, Criterion::Bce(_)));
    }

    #[test]
    fn test_dice_criterion_accepts_label_targets() {
        let device = Default::default();
        let criterion = get_loss_criterion::<Backend>("dice", None, None).unwrap();

        let input = Tensor::<Backend, 1>::from_floats([1.0, 0.0, 0.0, 1.0], &device)
            .reshape([1, 2, 1, 1, 2]);
        let target =
            SegTarget::Labels(Tensor::<Backend, 4, Int>::from_ints([[[[0, 1]]]], &device));

        // The one-hot expansion of [0, 1] matches the prediction exactly.
        let value = criterion.forward(input, &target).into_scalar().to_f64();
        assert!(value.abs() < 1e-5, "value = {value}");
    }

    #[test]
    #[should_panic(expected = "per-voxel weight map")]
    fn test_pce_requires_weighted_labels() {
        let device = Default::default();
        let criterion = get_loss_criterion::<Backend>("pce", None, None).unwrap();

        let input = Tensor::<Backend, 5>::zeros([1, 2, 1, 1, 2], &device);
        let target =
            SegTarget::Labels(Tensor::<Backend, 4, Int>::zeros([1, 1, 1, 2], &device));
        criterion.forward(input, &target);
    }
}

//! Ignore-index support for losses that lack it natively.

use burn::tensor::{backend::Backend, Tensor};

use super::{BceWithLogitsLoss, DiceLoss, GeneralizedDiceLoss};
use crate::error::{UNet3DError, UNet3DResult};

/// A loss evaluated on prediction/target tensors of identical shape.
///
/// `ignore_index` reports the sentinel the loss already masks on its
/// own, if any; [`IgnoreIndexLossWrapper`] refuses to wrap such losses
/// to avoid silent double-masking.
pub trait DenseLoss<B: Backend> {
    fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1>;

    fn ignore_index(&self) -> Option<i64> {
        None
    }
}

impl<B: Backend> DenseLoss<B> for BceWithLogitsLoss<B> {
    fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        BceWithLogitsLoss::forward(self, input, target)
    }
}

impl<B: Backend> DenseLoss<B> for DiceLoss<B> {
    fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        DiceLoss::forward(self, input, target)
    }

    fn ignore_index(&self) -> Option<i64> {
        DiceLoss::ignore_index(self)
    }
}

impl<B: Backend> DenseLoss<B> for GeneralizedDiceLoss<B> {
    fn forward(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        GeneralizedDiceLoss::forward(self, input, target)
    }

    fn ignore_index(&self) -> Option<i64> {
        GeneralizedDiceLoss::ignore_index(self)
    }
}

/// Wrapper around loss functions which do not support an ignore index,
/// e.g. binary cross-entropy.
///
/// Masks both prediction and target wherever the target equals the
/// sentinel, then delegates to the wrapped loss.
#[derive(Debug, Clone)]
pub struct IgnoreIndexLossWrapper<L> {
    inner: L,
    ignore_index: i64,
}

impl<L> IgnoreIndexLossWrapper<L> {
    /// Wraps `inner`, masking voxels whose target equals `ignore_index`.
    ///
    /// # Errors
    ///
    /// Fails if the wrapped loss already exposes an ignore index; use
    /// that configuration instead of wrapping.
    pub fn new<B: Backend>(inner: L, ignore_index: i64) -> UNet3DResult<Self>
    where
        L: DenseLoss<B>,
    {
        if let Some(existing) = inner.ignore_index() {
            return Err(UNet3DError::InvalidConfiguration {
                reason: format!(
                    "cannot wrap a loss that already masks ignore index {existing}; \
                     use the loss's own ignore_index instead"
                ),
            });
        }
        Ok(Self {
            inner,
            ignore_index,
        })
    }

    /// The sentinel this wrapper masks on.
    pub const fn ignore_index(&self) -> i64 {
        self.ignore_index
    }

    /// Masks both tensors at sentinel positions and evaluates the
    /// wrapped loss.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1>
    where
        L: DenseLoss<B>,
    {
        let keep = target.clone().not_equal_elem(self.ignore_index).float();
        self.inner.forward(input * keep.clone(), target * keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::losses::{BceWithLogitsLossConfig, DiceLossConfig};
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;
    use burn::tensor::Tensor;

    type Backend = NdArray<f32>;

    #[test]
    fn test_masked_positions_contribute_nothing() {
        let device = Default::default();
        let bce = BceWithLogitsLossConfig::new().init::<Backend>();
        let wrapper = IgnoreIndexLossWrapper::new::<Backend>(bce.clone(), -1).unwrap();

        // The second voxel is a confident wrong prediction; flagging it
        // in the target must zero its contribution.
        let input = Tensor::<Backend, 1>::from_floats([0.0, 10.0], &device)
            .reshape([1, 1, 1, 1, 2]);
        let flagged = Tensor::<Backend, 1>::from_floats([1.0, -1.0], &device)
            .reshape([1, 1, 1, 1, 2]);
        let clean = Tensor::<Backend, 1>::from_floats([1.0, 0.0], &device)
            .reshape([1, 1, 1, 1, 2]);
        let zeroed_input = Tensor::<Backend, 1>::from_floats([0.0, 0.0], &device)
            .reshape([1, 1, 1, 1, 2]);

        let wrapped = wrapper.forward(input, flagged).into_scalar().to_f64();
        let reference = bce.forward(zeroed_input, clean).into_scalar().to_f64();
        assert!((wrapped - reference).abs() < 1e-6);
    }

    #[test]
    fn test_refuses_double_ignore_configuration() {
        let dice = DiceLossConfig::new()
            .with_ignore_index(Some(5))
            .init::<Backend>();

        let result = IgnoreIndexLossWrapper::new::<Backend>(dice, 5);
        assert!(matches!(
            result,
            Err(crate::error::UNet3DError::InvalidConfiguration { .. })
        ));
    }
}

//! Binary cross-entropy on raw logits.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor},
};

/// Configuration for [`BceWithLogitsLoss`].
#[derive(Config, Debug)]
pub struct BceWithLogitsLossConfig {}

/// Binary cross-entropy loss taking raw logits.
///
/// Uses the numerically stable formulation
/// `max(x, 0) - x * y + ln(1 + exp(-|x|))`, so no separate sigmoid pass
/// is needed.
#[derive(Debug, Clone, Default)]
pub struct BceWithLogitsLoss<B: Backend> {
    _phantom: PhantomData<B>,
}

impl BceWithLogitsLossConfig {
    /// Initialize a new BCE-with-logits loss.
    pub const fn init<B: Backend>(&self) -> BceWithLogitsLoss<B> {
        BceWithLogitsLoss {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> BceWithLogitsLoss<B> {
    /// Calculate the mean binary cross-entropy over all elements.
    ///
    /// # Arguments
    /// * `input` - Raw logits
    /// * `target` - Ground truth labels, continuous values in `[0, 1]`
    ///
    /// # Panics
    ///
    /// Panics if `input` and `target` do not have the same shape.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        assert_eq!(
            input.shape(),
            target.shape(),
            "Input and target must have the same shape. Got input: {:?}, target: {:?}",
            input.shape(),
            target.shape()
        );

        let max_val = input.clone().clamp_min(0.0);
        let term1 = max_val - input.clone() * target;
        let term2 = input.abs().neg().exp().add_scalar(1.0).log();

        (term1 + term2).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;

    type Backend = NdArray<f32>;

    #[test]
    fn test_zero_logits_give_ln_two() {
        let device = Default::default();
        let loss = BceWithLogitsLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 1>::zeros([4], &device);
        let target = Tensor::<Backend, 1>::from_floats([0.0, 1.0, 0.0, 1.0], &device);

        let value = loss.forward(input, target).into_scalar().to_f64();
        assert!((value - std::f64::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_confident_correct_prediction_is_cheap() {
        let device = Default::default();
        let loss = BceWithLogitsLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 1>::from_floats([10.0, -10.0], &device);
        let target = Tensor::<Backend, 1>::from_floats([1.0, 0.0], &device);

        let value = loss.forward(input, target).into_scalar().to_f64();
        assert!(value > 0.0);
        assert!(value < 1e-3);
    }

    #[test]
    fn test_confident_wrong_prediction_is_expensive() {
        let device = Default::default();
        let loss = BceWithLogitsLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 1>::from_floats([10.0, -10.0], &device);
        let target = Tensor::<Backend, 1>::from_floats([0.0, 1.0], &device);

        let value = loss.forward(input, target).into_scalar().to_f64();
        assert!(value > 5.0);
    }

    #[test]
    #[should_panic(expected = "must have the same shape")]
    fn test_shape_mismatch_panics() {
        let device = Default::default();
        let loss = BceWithLogitsLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 2>::zeros([2, 2], &device);
        let target = Tensor::<Backend, 2>::zeros([2, 3], &device);

        loss.forward(input, target);
    }
}

//! Per-pixel weighted cross-entropy.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{activation, backend::Backend, Int, Tensor, TensorData},
};

use super::utils::expand_as_one_hot;

/// Configuration for [`PixelWiseCrossEntropyLoss`].
#[derive(Config, Debug)]
pub struct PixelWiseCrossEntropyLossConfig {
    /// Static per-channel class weights added to the per-voxel map.
    pub class_weights: Option<Vec<f32>>,
    pub ignore_index: Option<i64>,
}

/// Cross-entropy with an additional per-voxel weight map.
///
/// The weight map is passed through a log-sigmoid, broadcast to all
/// channels and combined with the static class weights; the combined
/// weights are inverted and clamped at 10 to guard against division
/// blow-up near zero, so the hardest voxels dominate the loss without
/// destabilizing it.
#[derive(Debug, Clone)]
pub struct PixelWiseCrossEntropyLoss<B: Backend> {
    class_weights: Option<Vec<f32>>,
    ignore_index: Option<i64>,
    _phantom: PhantomData<B>,
}

impl PixelWiseCrossEntropyLossConfig {
    /// Initialize a new pixel-wise cross-entropy loss with the given configuration.
    pub fn init<B: Backend>(&self) -> PixelWiseCrossEntropyLoss<B> {
        PixelWiseCrossEntropyLoss {
            class_weights: self.class_weights.clone(),
            ignore_index: self.ignore_index,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for PixelWiseCrossEntropyLoss<B> {
    fn default() -> Self {
        PixelWiseCrossEntropyLossConfig::new().init()
    }
}

impl<B: Backend> PixelWiseCrossEntropyLoss<B> {
    /// Calculate the pixel-wise weighted cross-entropy loss.
    ///
    /// # Arguments
    /// * `input` - Raw logits with shape `[N, C, D, H, W]`
    /// * `target` - Integer labels with shape `[N, D, H, W]`
    /// * `weights` - Per-voxel weight map with the same shape as `target`
    ///
    /// # Panics
    ///
    /// Panics if `target` and `weights` do not have the same shape.
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
        target: Tensor<B, 4, Int>,
        weights: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        assert_eq!(
            target.dims(),
            weights.dims(),
            "'target' and 'weights' must have the same shape. Got target: {:?}, weights: {:?}",
            target.dims(),
            weights.dims()
        );

        let [n, c, d, h, w] = input.dims();
        let device = input.device();

        // normalize the input
        let log_probs = activation::log_softmax(input, 1);
        let weights = activation::log_sigmoid(weights);

        let target = expand_as_one_hot(target, c, self.ignore_index);

        // expand weights to all channels
        let weights = weights.unsqueeze_dim::<5>(1).expand([n, c, d, h, w]);

        let class_weights: Tensor<B, 1> = match &self.class_weights {
            Some(cw) => Tensor::from_data(TensorData::new(cw.clone(), [cw.len()]), &device),
            None => Tensor::ones([c], &device),
        };
        let class_weights = class_weights.reshape([1, c as i32, 1, 1, 1]);

        // add class_weights to each channel, then invert: the smaller the
        // combined weight, the harder the voxel.
        let weights = (weights + class_weights).recip().clamp_max(10.0);

        (weights * target * log_probs).neg().mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;

    type Backend = NdArray<f32>;

    #[test]
    fn test_loss_is_finite_and_positive() {
        let device = Default::default();
        let loss = PixelWiseCrossEntropyLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 5>::random(
            [1, 2, 1, 2, 2],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let target = Tensor::<Backend, 4, Int>::from_ints([[[[0, 1], [1, 0]]]], &device);
        let weights = Tensor::<Backend, 4>::zeros([1, 1, 2, 2], &device);

        let value = loss.forward(input, target, weights).into_scalar().to_f64();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn test_inverted_weights_are_clamped_at_ten() {
        let device = Default::default();
        // With class weight 1, a map value of 9 leaves the combined
        // weight near 1 (inverted ~ 1); a map value of -0.54 puts the
        // combined weight just above zero, so the inverse explodes and
        // must be caught by the clamp at 10.
        let loss = PixelWiseCrossEntropyLossConfig::new()
            .with_class_weights(Some(vec![1.0, 1.0]))
            .init::<Backend>();

        let input = Tensor::<Backend, 5>::zeros([1, 2, 1, 1, 2], &device);
        let target = Tensor::<Backend, 4, Int>::from_ints([[[[0, 1]]]], &device);

        let mild = loss
            .forward(
                input.clone(),
                target.clone(),
                Tensor::<Backend, 4>::from_floats([[[[9.0, 9.0]]]], &device),
            )
            .into_scalar()
            .to_f64();
        let harsh = loss
            .forward(
                input,
                target,
                Tensor::<Backend, 4>::from_floats([[[[-0.54, -0.54]]]], &device),
            )
            .into_scalar()
            .to_f64();

        // mild: weight ~ 1 on the two target voxels -> mean ~ ln(2) / 2.
        assert!((mild - std::f64::consts::LN_2 / 2.0).abs() < 0.01, "mild = {mild}");
        // harsh: clamped weight of exactly 10 -> mean = 10 * ln(2) / 2.
        assert!(
            (harsh - 10.0 * std::f64::consts::LN_2 / 2.0).abs() < 0.2,
            "harsh = {harsh}"
        );
        assert!(harsh > mild);
    }

    #[test]
    #[should_panic(expected = "must have the same shape")]
    fn test_weight_shape_mismatch_panics() {
        let device = Default::default();
        let loss = PixelWiseCrossEntropyLossConfig::new().init::<Backend>();

        let input = Tensor::<Backend, 5>::zeros([1, 2, 1, 2, 2], &device);
        let target = Tensor::<Backend, 4, Int>::zeros([1, 1, 2, 2], &device);
        let weights = Tensor::<Backend, 4>::zeros([1, 2, 2, 2], &device);

        loss.forward(input, target, weights);
    }
}

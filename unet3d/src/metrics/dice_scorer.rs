//! Per-batch overlap counting.

use burn::{
    prelude::*,
    tensor::{backend::Backend, cast::ToElement, Tensor},
};

/// Per-batch counts produced by [`DiceScorer`] and consumed by
/// [`RunningAcc`](crate::metrics::RunningAcc).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    /// Total predicted-positive voxels (A).
    pub predicted: f64,
    /// Total ground-truth-positive voxels (B).
    pub actual: f64,
    /// Intersection count (I).
    pub intersection: f64,
    /// Mean absolute error of the continuous prediction.
    pub mae: f64,
}

/// Configuration for [`DiceScorer`].
#[derive(Config, Debug)]
pub struct DiceScorerConfig {
    /// Predictions are discretized to `{0, 1}` at this threshold before
    /// counting.
    #[config(default = 0.5)]
    pub threshold: f64,
}

/// Turns a continuous prediction and a binary target into overlap
/// counts.
///
/// The thresholding is a discretization step, not a probability
/// comparison; the MAE is computed on the prediction as given.
#[derive(Debug, Clone)]
pub struct DiceScorer {
    threshold: f64,
}

impl DiceScorerConfig {
    /// Initialize a new scorer with the given configuration.
    pub const fn init(&self) -> DiceScorer {
        DiceScorer {
            threshold: self.threshold,
        }
    }
}

impl Default for DiceScorer {
    fn default() -> Self {
        DiceScorerConfig::new().init()
    }
}

impl DiceScorer {
    /// Count predicted/actual/intersection voxels for one batch.
    pub fn score<B: Backend, const D: usize>(
        &self,
        output: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> BatchStats {
        let mae = (output.clone() - target.clone())
            .abs()
            .mean()
            .into_scalar()
            .to_f64();

        let binary = output.greater_equal_elem(self.threshold).float();
        let predicted = binary.clone().sum().into_scalar().to_f64();
        let actual = target.clone().sum().into_scalar().to_f64();
        let intersection = (binary * target).sum().into_scalar().to_f64();

        BatchStats {
            predicted,
            actual,
            intersection,
            mae,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_counts_on_known_tensors() {
        let device = Default::default();
        let scorer = DiceScorerConfig::new().init();

        let output = Tensor::<Backend, 2>::from_floats([[0.9, 0.4], [0.6, 0.1]], &device);
        let target = Tensor::<Backend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);

        let stats = scorer.score(output, target);
        assert_eq!(stats.predicted, 2.0);
        assert_eq!(stats.actual, 2.0);
        assert_eq!(stats.intersection, 1.0);

        let expected_mae = (0.1 + 0.4 + 0.6 + 0.9) / 4.0;
        assert!((stats.mae - expected_mae).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let device = Default::default();
        let scorer = DiceScorerConfig::new().init();

        let output = Tensor::<Backend, 1>::from_floats([0.5, 0.49], &device);
        let target = Tensor::<Backend, 1>::from_floats([1.0, 1.0], &device);

        let stats = scorer.score(output, target);
        assert_eq!(stats.predicted, 1.0);
        assert_eq!(stats.intersection, 1.0);
    }
}

//! Target forms accepted by the loss family.

use burn::tensor::{backend::Backend, Int, Tensor};

use super::utils::expand_as_one_hot;

/// Ground truth for one batch, in the form the data loader supplies it.
///
/// Losses state which forms they accept; handing the wrong form to a
/// criterion is a precondition violation and fails fast at the call
/// site.
#[derive(Debug, Clone)]
pub enum SegTarget<B: Backend> {
    /// Already-expanded mask with the same shape as the prediction.
    Mask(Tensor<B, 5>),
    /// Integer class labels, one per voxel.
    Labels(Tensor<B, 4, Int>),
    /// Class labels plus a per-voxel weight map of the same shape.
    WeightedLabels {
        labels: Tensor<B, 4, Int>,
        weights: Tensor<B, 4>,
    },
}

impl<B: Backend> SegTarget<B> {
    /// Returns the target as a dense prediction-shaped mask, expanding
    /// label volumes to one-hot form.
    ///
    /// `ignore_index` positions are kept at the sentinel value in every
    /// channel so that losses which mask them can find them.
    pub fn to_mask(&self, num_classes: usize, ignore_index: Option<i64>) -> Tensor<B, 5> {
        match self {
            Self::Mask(mask) => mask.clone(),
            Self::Labels(labels) | Self::WeightedLabels { labels, .. } => {
                expand_as_one_hot(labels.clone(), num_classes, ignore_index)
            }
        }
    }

    /// Returns the integer label volume.
    ///
    /// # Panics
    ///
    /// Panics if the target is a dense mask; the cross-entropy family
    /// requires label targets.
    pub fn labels(&self) -> Tensor<B, 4, Int> {
        match self {
            Self::Labels(labels) | Self::WeightedLabels { labels, .. } => labels.clone(),
            Self::Mask(_) => panic!(
                "this loss requires integer label targets, but the batch carries a dense mask"
            ),
        }
    }

    /// Number of samples in the batch.
    pub fn batch_size(&self) -> usize {
        match self {
            Self::Mask(mask) => mask.dims()[0],
            Self::Labels(labels) | Self::WeightedLabels { labels, .. } => labels.dims()[0],
        }
    }

    /// Concatenates several targets along the batch axis.
    ///
    /// # Panics
    ///
    /// Panics if the targets do not all carry the same form.
    pub fn cat(targets: Vec<Self>) -> Self {
        assert!(!targets.is_empty(), "cannot concatenate zero targets");

        match &targets[0] {
            Self::Mask(_) => {
                let masks = targets
                    .into_iter()
                    .map(|t| match t {
                        Self::Mask(mask) => mask,
                        _ => panic!("augmented views must all carry the same target form"),
                    })
                    .collect();
                Self::Mask(Tensor::cat(masks, 0))
            }
            Self::Labels(_) => {
                let labels = targets
                    .into_iter()
                    .map(|t| match t {
                        Self::Labels(labels) => labels,
                        _ => panic!("augmented views must all carry the same target form"),
                    })
                    .collect();
                Self::Labels(Tensor::cat(labels, 0))
            }
            Self::WeightedLabels { .. } => {
                let (labels, weights): (Vec<_>, Vec<_>) = targets
                    .into_iter()
                    .map(|t| match t {
                        Self::WeightedLabels { labels, weights } => (labels, weights),
                        _ => panic!("augmented views must all carry the same target form"),
                    })
                    .unzip();
                Self::WeightedLabels {
                    labels: Tensor::cat(labels, 0),
                    weights: Tensor::cat(weights, 0),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_labels_to_mask() {
        let device = Default::default();
        let target = SegTarget::<Backend>::Labels(Tensor::from_ints([[[[0, 1]]]], &device));

        let mask = target.to_mask(2, None);
        assert_eq!(mask.dims(), [1, 2, 1, 1, 2]);

        let values = mask.into_data();
        let values = values.as_slice::<f32>().unwrap();
        assert_eq!(values, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_cat_masks() {
        let device = Default::default();
        let a = SegTarget::<Backend>::Mask(Tensor::zeros([2, 1, 1, 2, 2], &device));
        let b = SegTarget::<Backend>::Mask(Tensor::ones([3, 1, 1, 2, 2], &device));

        let merged = SegTarget::cat(vec![a, b]);
        assert_eq!(merged.batch_size(), 5);
    }

    #[test]
    #[should_panic(expected = "same target form")]
    fn test_cat_mixed_forms_panics() {
        let device = Default::default();
        let a = SegTarget::<Backend>::Mask(Tensor::zeros([1, 1, 1, 2, 2], &device));
        let b = SegTarget::<Backend>::Labels(Tensor::zeros([1, 1, 2, 2], &device));

        SegTarget::cat(vec![a, b]);
    }
}

//! Batch shapes accepted by the training loop.
//!
//! The loader seam hands the trainer a closed set of batch forms
//! instead of variable-arity tuples: plain input/target pairs, pairs
//! with a separate deep-supervision target, named validation batches,
//! and augmented batches carrying several views that are merged along
//! the batch axis before the forward pass.

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Tensor},
};

use crate::losses::SegTarget;

/// One input/target view of an augmented batch.
#[derive(Debug, Clone)]
pub struct SegView<B: Backend> {
    pub input: Tensor<B, 5>,
    pub target: SegTarget<B>,
}

/// A batch produced by the data-loader collaborator.
#[derive(Debug, Clone)]
pub enum SegBatch<B: Backend> {
    /// Plain input/target pair.
    Basic {
        input: Tensor<B, 5>,
        target: SegTarget<B>,
    },
    /// Input/target pair with a separate target for the
    /// deep-supervision outputs.
    WithAux {
        input: Tensor<B, 5>,
        target: SegTarget<B>,
        aux_target: SegTarget<B>,
    },
    /// Validation batch carrying a sample name; the name is accepted
    /// but unused by the core loop.
    Named {
        input: Tensor<B, 5>,
        target: SegTarget<B>,
        aux_target: SegTarget<B>,
        name: String,
    },
    /// Base batch plus augmented views, merged along the batch axis
    /// before training.
    Augmented { views: Vec<SegView<B>> },
}

impl<B: Backend> SegBatch<B> {
    /// Collapses the batch into `(input, target, deep-supervision
    /// target)`, merging augmented views along the batch axis.
    ///
    /// Batches without a separate auxiliary target reuse the main
    /// target for deep supervision.
    pub fn into_parts(self) -> (Tensor<B, 5>, SegTarget<B>, SegTarget<B>) {
        match self {
            Self::Basic { input, target } => (input, target.clone(), target),
            Self::WithAux {
                input,
                target,
                aux_target,
            }
            | Self::Named {
                input,
                target,
                aux_target,
                ..
            } => (input, target, aux_target),
            Self::Augmented { views } => {
                assert!(!views.is_empty(), "an augmented batch needs at least one view");
                let (inputs, targets): (Vec<_>, Vec<_>) =
                    views.into_iter().map(|v| (v.input, v.target)).unzip();
                let input = Tensor::cat(inputs, 0);
                let target = SegTarget::cat(targets);
                (input, target.clone(), target)
            }
        }
    }
}

/// A single preprocessed sample: one volume and its mask, optionally
/// with a separate deep-supervision mask.
#[derive(Debug, Clone)]
pub struct SegItem<B: Backend> {
    /// Input volume with shape `[C, D, H, W]`.
    pub image: Tensor<B, 4>,
    /// Ground-truth mask with shape `[C, D, H, W]`.
    pub mask: Tensor<B, 4>,
    /// Optional deep-supervision mask with the same shape.
    pub aux_mask: Option<Tensor<B, 4>>,
}

/// Batcher stacking [`SegItem`]s into a [`SegBatch`] along a new batch
/// dimension.
#[derive(Debug, Clone, Default)]
pub struct SegBatcher<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> SegBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegItem<B>, SegBatch<B>> for SegBatcher<B> {
    fn batch(&self, items: Vec<SegItem<B>>, _device: &B::Device) -> SegBatch<B> {
        let batch_size = items.len();
        let with_aux = items.iter().all(|item| item.aux_mask.is_some());

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut aux_masks = Vec::with_capacity(batch_size);

        for item in items {
            images.push(item.image);
            masks.push(item.mask);
            if with_aux {
                if let Some(aux) = item.aux_mask {
                    aux_masks.push(aux);
                }
            }
        }

        let input = Tensor::stack(images, 0);
        let target = SegTarget::Mask(Tensor::stack(masks, 0));

        if with_aux {
            SegBatch::WithAux {
                input,
                target,
                aux_target: SegTarget::Mask(Tensor::stack(aux_masks, 0)),
            }
        } else {
            SegBatch::Basic { input, target }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    fn view(batch: usize, fill: f32) -> SegView<Backend> {
        let device = Default::default();
        SegView {
            input: Tensor::ones([batch, 1, 1, 2, 2], &device).mul_scalar(fill),
            target: SegTarget::Mask(Tensor::ones([batch, 1, 1, 2, 2], &device)),
        }
    }

    #[test]
    fn test_augmented_views_merge_along_batch_axis() {
        let batch = SegBatch::Augmented {
            views: vec![view(2, 1.0), view(1, 2.0), view(1, 3.0)],
        };

        let (input, target, aux_target) = batch.into_parts();
        assert_eq!(input.dims(), [4, 1, 1, 2, 2]);
        assert_eq!(target.batch_size(), 4);
        assert_eq!(aux_target.batch_size(), 4);
    }

    #[test]
    fn test_basic_batch_reuses_target_for_deep_supervision() {
        let device = Default::default();
        let batch = SegBatch::<Backend>::Basic {
            input: Tensor::zeros([2, 1, 1, 2, 2], &device),
            target: SegTarget::Mask(Tensor::ones([2, 1, 1, 2, 2], &device)),
        };

        let (_, target, aux_target) = batch.into_parts();
        assert_eq!(target.batch_size(), aux_target.batch_size());
    }

    #[test]
    fn test_batcher_stacks_items() {
        let device = Default::default();
        let batcher = SegBatcher::<Backend>::new();

        let item = |fill: f32| SegItem::<Backend> {
            image: Tensor::ones([1, 1, 2, 2], &device).mul_scalar(fill),
            mask: Tensor::zeros([1, 1, 2, 2], &device),
            aux_mask: None,
        };

        let batch = batcher.batch(vec![item(1.0), item(2.0), item(3.0)], &device);
        match batch {
            SegBatch::Basic { input, target } => {
                assert_eq!(input.dims(), [3, 1, 1, 2, 2]);
                assert_eq!(target.batch_size(), 3);
            }
            other => panic!("expected a basic batch, got {other:?}"),
        }
    }

    #[test]
    fn test_batcher_promotes_aux_masks() {
        let device = Default::default();
        let batcher = SegBatcher::<Backend>::new();

        let item = SegItem::<Backend> {
            image: Tensor::ones([1, 1, 2, 2], &device),
            mask: Tensor::zeros([1, 1, 2, 2], &device),
            aux_mask: Some(Tensor::ones([1, 1, 2, 2], &device)),
        };

        let batch = batcher.batch(vec![item.clone(), item], &device);
        assert!(matches!(batch, SegBatch::WithAux { .. }));
    }
}

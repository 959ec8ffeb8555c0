//! The model collaborator interface.

use burn::tensor::{backend::Backend, Tensor};

/// Output of one forward pass of the segmentation network.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// Encoder features, when the network exposes them.
    pub features: Option<Tensor<B, 5>>,
    /// Main full-resolution prediction.
    pub prediction: Tensor<B, 5>,
    /// Intermediate decoder outputs for deep supervision.
    pub deep_outputs: Vec<Tensor<B, 5>>,
}

/// A segmentation network the trainer can drive.
///
/// The trainer only needs a forward pass; parameter updates go through
/// the optimizer collaborator and evaluation-mode forwards run on the
/// inner-backend copy produced by `AutodiffModule::valid`.
pub trait SegmentationModel<B: Backend> {
    fn forward(&self, input: Tensor<B, 5>) -> SegmentationOutput<B>;
}

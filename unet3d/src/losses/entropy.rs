//! Unsupervised entropy regularizer.

use std::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{backend::Backend, Tensor},
};

use super::Normalization;

/// Configuration for [`EntropyLoss`].
#[derive(Config, Debug)]
pub struct EntropyLossConfig {
    /// Lower clamp on probabilities before the log, so the regularizer
    /// stays finite when the normalization saturates.
    #[config(default = 1e-5)]
    pub epsilon: f64,
    #[config(default = "Normalization::Sigmoid")]
    pub normalization: Normalization,
}

/// Entropy regularizer `sum(-p * log(p))` over normalized predictions.
///
/// Unsupervised: any target handed to the criterion is ignored.
#[derive(Debug, Clone)]
pub struct EntropyLoss<B: Backend> {
    epsilon: f64,
    normalization: Normalization,
    _phantom: PhantomData<B>,
}

impl EntropyLossConfig {
    /// Initialize a new entropy loss with the given configuration.
    pub fn init<B: Backend>(&self) -> EntropyLoss<B> {
        EntropyLoss {
            epsilon: self.epsilon,
            normalization: self.normalization.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Default for EntropyLoss<B> {
    fn default() -> Self {
        EntropyLossConfig::new().init()
    }
}

impl<B: Backend> EntropyLoss<B> {
    /// Calculate the summed entropy of the normalized predictions.
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 1> {
        // get probabilities from logits
        let probs = self.normalization.apply(input).clamp_min(self.epsilon);
        (probs.clone() * probs.log()).sum().neg()
    }
}

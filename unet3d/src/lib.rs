//! Segmentation losses and the training loop for a 3D UNet, built on
//! the Burn framework.
//!
//! The crate provides three layers:
//!
//! - [`losses`]: the loss family (Dice, Generalized Dice, cross-entropy
//!   variants, focal, entropy) behind a closed [`losses::Criterion`]
//!   produced by [`losses::get_loss_criterion`];
//! - [`metrics`]: running accumulators for loss logging and
//!   Dice/IoU/precision/recall tracking;
//! - [`trainer`]: the epoch/iteration state machine with validation
//!   cadence, early stopping, learning-rate decay and checkpointing.
//!
//! The network, optimizer and data pipeline are collaborators: any
//! `AutodiffModule` implementing [`trainer::SegmentationModel`], any
//! `burn::optim::Optimizer`, and any `DataLoader` yielding
//! [`trainer::SegBatch`]es.

pub mod config;
pub mod error;
pub mod losses;
pub mod metrics;
pub mod trainer;

pub use config::TrainerConfig;
pub use error::{UNet3DError, UNet3DResult};
pub use losses::{get_loss_criterion, Criterion, LossKind, SegTarget, SUPPORTED_LOSSES};
pub use metrics::{BatchStats, DiceScorer, DiceScorerConfig, RunningAcc, RunningAverage};
pub use trainer::{
    Loaders, PatienceOverride, SegBatch, SegBatcher, SegItem, SegView, SegmentationModel,
    SegmentationOutput, TrainerState, UNet3DTrainer,
};

//! Training and validation metrics.
//!
//! Running accumulators for loss logging and Dice/IoU/precision/recall
//! tracking across an arbitrary-length stream of batches, plus the
//! scorer that turns continuous predictions into per-batch counts.

pub mod dice_scorer;
pub mod running_acc;
pub mod running_average;

pub use dice_scorer::{BatchStats, DiceScorer, DiceScorerConfig};
pub use running_acc::RunningAcc;
pub use running_average::RunningAverage;

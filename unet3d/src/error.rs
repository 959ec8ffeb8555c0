use thiserror::Error;

/// The error type for `unet3d-burn` operations.
///
/// Precondition violations inside the numeric kernels (shape mismatches,
/// wrong target form) are fatal assertions at the call site; this enum
/// covers the configuration-time and I/O failures that callers can
/// meaningfully handle.
#[derive(Error, Debug)]
pub enum UNet3DError {
    /// Error for when a loss name outside the supported set is requested.
    #[error("Unsupported loss: {name}")]
    UnsupportedLoss {
        /// The rejected loss name.
        name: String,
    },

    /// Error for when a logically inconsistent configuration is provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when reading or writing a checkpoint fails.
    #[error("Checkpoint error: {message}")]
    Checkpoint {
        /// The error message.
        message: String,
    },
}

/// A specialized `Result` type for `unet3d-burn` operations.
pub type UNet3DResult<T> = Result<T, UNet3DError>;

//! Trainer configuration.
//!
//! Covers the epoch/iteration limits, validation and logging cadence,
//! early-stopping patience and learning-rate schedule of the training
//! loop. Loaded from and saved to JSON.

use std::{fs, path::Path};

use burn::prelude::*;

use crate::error::{UNet3DError, UNet3DResult};

/// Configuration for the 3D UNet training loop.
#[derive(Config, Debug)]
pub struct TrainerConfig {
    /// Directory for the `last`/`best` checkpoint sets.
    pub checkpoint_dir: String,

    /// Maximum number of training epochs.
    #[config(default = 200)]
    pub max_num_epochs: usize,

    /// Maximum number of training iterations across all epochs.
    #[config(default = 100_000)]
    pub max_num_iterations: usize,

    /// Number of non-improving validation runs after which the patience
    /// counter is reset on improvement.
    #[config(default = 100)]
    pub max_patience: usize,

    /// Initial patience counter.
    #[config(default = 20)]
    pub patience: usize,

    /// Run validation after this many iterations.
    #[config(default = 100)]
    pub validate_after_iters: usize,

    /// Emit training statistics after this many iterations.
    #[config(default = 100)]
    pub log_after_iters: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Multiplier applied to the learning rate when patience crosses
    /// half of `max_patience`.
    #[config(default = 0.1)]
    pub lr_decay_rate: f64,
}

impl TrainerConfig {
    /// Loads a trainer configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json(path: impl AsRef<Path>) -> UNet3DResult<Self> {
        let config_str =
            fs::read_to_string(path).map_err(|e| UNet3DError::InvalidConfiguration {
                reason: format!("failed to read trainer configuration: {e}"),
            })?;
        serde_json::from_str(&config_str).map_err(|e| UNet3DError::InvalidConfiguration {
            reason: format!("failed to parse trainer configuration: {e}"),
        })
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_json(&self, path: impl AsRef<Path>) -> UNet3DResult<()> {
        let config_str =
            serde_json::to_string_pretty(self).map_err(|e| UNet3DError::InvalidConfiguration {
                reason: format!("failed to serialize trainer configuration: {e}"),
            })?;
        fs::write(path, config_str).map_err(|e| UNet3DError::InvalidConfiguration {
            reason: format!("failed to write trainer configuration: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainerConfig::new("./checkpoints".to_string());

        assert_eq!(config.max_num_epochs, 200);
        assert_eq!(config.max_num_iterations, 100_000);
        assert_eq!(config.validate_after_iters, 100);
        assert_eq!(config.log_after_iters, 100);
        assert_eq!(config.max_patience, 100);
        assert_eq!(config.patience, 20);
        assert!((config.lr_decay_rate - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainerConfig::new("./out".to_string())
            .with_max_num_epochs(7)
            .with_validate_after_iters(3)
            .with_learning_rate(5e-3);

        let path = std::env::temp_dir().join(format!(
            "unet3d-config-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        config.save_json(&path).unwrap();
        let restored = TrainerConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(restored.max_num_epochs, 7);
        assert_eq!(restored.validate_after_iters, 3);
        assert!((restored.learning_rate - 5e-3).abs() < f64::EPSILON);
    }
}

//! Trainer state persistence.
//!
//! The trainer state and its limits are snapshotted to JSON (written
//! atomically through a temp-file rename); model and optimizer
//! parameters are persisted separately through burn's record system.
//! Two sets of files are maintained: `last` and `best`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{UNet3DError, UNet3DResult};

/// The mutable schedule state of a training run.
///
/// Mutated monotonically forward in time by the owning trainer;
/// checkpoints snapshot it without taking ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub num_epoch: usize,
    pub num_iterations: usize,
    /// Best validation accuracy so far; `None` until the first
    /// validation run.
    pub best_val_accuracy: Option<f64>,
    pub patience: usize,
    pub max_patience: usize,
}

impl TrainerState {
    pub const fn new(patience: usize, max_patience: usize) -> Self {
        Self {
            num_epoch: 0,
            num_iterations: 0,
            best_val_accuracy: None,
            patience,
            max_patience,
        }
    }
}

/// Patience values applied when resuming from a checkpoint, replacing
/// whatever was saved.
///
/// A resumed run gets a fresh early-stopping allowance; the reset is an
/// explicit parameter here rather than implicit behavior.
#[derive(Debug, Clone, Copy)]
pub struct PatienceOverride {
    pub patience: usize,
    pub max_patience: usize,
}

impl Default for PatienceOverride {
    fn default() -> Self {
        Self {
            patience: 100,
            max_patience: 100,
        }
    }
}

/// Everything the JSON side of a checkpoint carries: the schedule state
/// plus the limits and cadences it was produced under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub state: TrainerState,
    pub max_num_epochs: usize,
    pub max_num_iterations: usize,
    pub validate_after_iters: usize,
    pub log_after_iters: usize,
}

/// File layout of a checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    dir: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_state(&self) -> PathBuf {
        self.dir.join("last_state.json")
    }

    /// Stem of the last model record; the recorder appends its own
    /// extension.
    pub fn last_model(&self) -> PathBuf {
        self.dir.join("last_model")
    }

    pub fn last_optimizer(&self) -> PathBuf {
        self.dir.join("last_optimizer")
    }

    pub fn best_state(&self) -> PathBuf {
        self.dir.join("best_state.json")
    }

    pub fn best_model(&self) -> PathBuf {
        self.dir.join("best_model")
    }

    pub fn best_optimizer(&self) -> PathBuf {
        self.dir.join("best_optimizer")
    }
}

/// Writes the checkpoint metadata atomically: the JSON lands under a
/// temporary name first and is moved into place with a rename.
pub fn write_meta_atomic(path: &Path, meta: &CheckpointMeta) -> UNet3DResult<()> {
    let json = serde_json::to_string_pretty(meta).map_err(|e| UNet3DError::Checkpoint {
        message: format!("failed to serialize trainer state: {e}"),
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).map_err(|e| UNet3DError::Checkpoint {
        message: format!("failed to write {}: {e}", tmp.display()),
    })?;
    fs::rename(&tmp, path).map_err(|e| UNet3DError::Checkpoint {
        message: format!("failed to move {} into place: {e}", tmp.display()),
    })
}

/// Reads checkpoint metadata back from disk.
pub fn read_meta(path: &Path) -> UNet3DResult<CheckpointMeta> {
    let json = fs::read_to_string(path).map_err(|e| UNet3DError::Checkpoint {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&json).map_err(|e| UNet3DError::Checkpoint {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("unet3d-{tag}-{}.json", std::process::id()))
    }

    #[test]
    fn test_meta_round_trip() {
        let meta = CheckpointMeta {
            state: TrainerState {
                num_epoch: 3,
                num_iterations: 1200,
                best_val_accuracy: Some(0.87),
                patience: 42,
                max_patience: 100,
            },
            max_num_epochs: 200,
            max_num_iterations: 100_000,
            validate_after_iters: 100,
            log_after_iters: 100,
        };

        let path = temp_path("meta-round-trip");
        write_meta_atomic(&path, &meta).unwrap();
        let restored = read_meta(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(restored.state, meta.state);
        assert_eq!(restored.max_num_epochs, 200);
    }

    #[test]
    fn test_fresh_state_has_no_best_accuracy() {
        let state = TrainerState::new(20, 100);
        assert_eq!(state.best_val_accuracy, None);
        assert_eq!(state.num_epoch, 0);
        assert_eq!(state.num_iterations, 0);

        // A fresh state survives the JSON round trip even before any
        // validation has produced a best value.
        let json = serde_json::to_string(&state).unwrap();
        let restored: TrainerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let meta = CheckpointMeta {
            state: TrainerState::new(1, 1),
            max_num_epochs: 1,
            max_num_iterations: 1,
            validate_after_iters: 1,
            log_after_iters: 1,
        };

        let path = temp_path("meta-no-tmp");
        write_meta_atomic(&path, &meta).unwrap();

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
        fs::remove_file(&path).ok();
    }
}

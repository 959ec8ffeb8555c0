//! 3D UNet trainer.
//!
//! Orchestrates epochs and iterations, the validation cadence,
//! best-model tracking, early stopping, learning-rate decay and
//! checkpoint persistence. The model, optimizer and data loaders are
//! collaborators behind traits; the trainer owns its schedule state
//! exclusively for the duration of `fit`.

pub mod batch;
pub mod checkpoint;
pub mod model;

pub use batch::{SegBatch, SegBatcher, SegItem, SegView};
pub use checkpoint::{CheckpointMeta, CheckpointPaths, PatienceOverride, TrainerState};
pub use model::{SegmentationModel, SegmentationOutput};

use std::{path::Path, sync::Arc};

use burn::{
    data::dataloader::DataLoader,
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    record::{CompactRecorder, Recorder},
    tensor::{backend::AutodiffBackend, cast::ToElement},
};
use tracing::info;

use crate::{
    config::TrainerConfig,
    error::{UNet3DError, UNet3DResult},
    losses::Criterion,
    metrics::{DiceScorer, DiceScorerConfig, RunningAcc, RunningAverage},
};

/// Weight applied to each deep-supervision loss term.
const DEEP_SUPERVISION_WEIGHT: f64 = 0.4;

/// The training and validation data loaders of one run.
pub struct Loaders<B: AutodiffBackend> {
    pub train: Arc<dyn DataLoader<B, SegBatch<B>>>,
    pub val: Arc<dyn DataLoader<B::InnerBackend, SegBatch<B::InnerBackend>>>,
}

/// 3D UNet trainer.
///
/// Generic over the autodiff backend, the model and the optimizer. A
/// trainer is constructed once (fresh, from a checkpoint, or from
/// pretrained weights) and then driven to completion with [`fit`].
///
/// [`fit`]: UNet3DTrainer::fit
pub struct UNet3DTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: SegmentationModel<B> + AutodiffModule<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    model: M,
    optimizer: O,
    criterion: Criterion<B>,
    scorer: DiceScorer,
    state: TrainerState,
    config: TrainerConfig,
    learning_rate: f64,
    paths: CheckpointPaths,
    loaders: Loaders<B>,
}

impl<B, M, O> UNet3DTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: SegmentationModel<B> + AutodiffModule<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    /// Creates a fresh trainer.
    pub fn new(
        config: TrainerConfig,
        model: M,
        optimizer: O,
        criterion: Criterion<B>,
        loaders: Loaders<B>,
    ) -> Self {
        info!(devices = ?model.devices(), "sending the model to its training device");

        let state = TrainerState::new(config.patience, config.max_patience);
        let learning_rate = config.learning_rate;
        let paths = CheckpointPaths::new(&config.checkpoint_dir);

        Self {
            model,
            optimizer,
            criterion,
            scorer: DiceScorerConfig::new().init(),
            state,
            config,
            learning_rate,
            paths,
            loaders,
        }
    }

    /// Resumes a trainer from the `last` checkpoint set in the
    /// configured checkpoint directory.
    ///
    /// The full schedule state (epoch, iteration, best accuracy) and
    /// the epoch/iteration limits come from the checkpoint; the
    /// patience counters are replaced by `patience_override`.
    ///
    /// # Errors
    ///
    /// Fails if any checkpoint artifact cannot be read.
    pub fn from_checkpoint(
        config: TrainerConfig,
        model: M,
        optimizer: O,
        criterion: Criterion<B>,
        loaders: Loaders<B>,
        device: &B::Device,
        patience_override: PatienceOverride,
    ) -> UNet3DResult<Self> {
        let paths = CheckpointPaths::new(&config.checkpoint_dir);
        info!(checkpoint = %paths.last_state().display(), "loading checkpoint");

        let meta = checkpoint::read_meta(&paths.last_state())?;
        info!(
            epoch = meta.state.num_epoch,
            best_val_accuracy = ?meta.state.best_val_accuracy,
            num_iterations = meta.state.num_iterations,
            "checkpoint loaded"
        );

        let model = model
            .load_file(paths.last_model(), &CompactRecorder::new(), device)
            .map_err(|e| UNet3DError::Checkpoint {
                message: format!("failed to load model record: {e}"),
            })?;
        let optimizer_record: O::Record = CompactRecorder::new()
            .load(paths.last_optimizer(), device)
            .map_err(|e| UNet3DError::Checkpoint {
                message: format!("failed to load optimizer record: {e}"),
            })?;
        let optimizer = optimizer.load_record(optimizer_record);

        let mut state = meta.state;
        state.patience = patience_override.patience;
        state.max_patience = patience_override.max_patience;

        let config = config
            .with_max_num_epochs(meta.max_num_epochs)
            .with_max_num_iterations(meta.max_num_iterations);
        let learning_rate = config.learning_rate;

        Ok(Self {
            model,
            optimizer,
            criterion,
            scorer: DiceScorerConfig::new().init(),
            state,
            config,
            learning_rate,
            paths,
            loaders,
        })
    }

    /// Creates a trainer from pretrained model weights.
    ///
    /// Only the model parameters are loaded; the optimizer and the
    /// schedule state start fresh.
    ///
    /// # Errors
    ///
    /// Fails if the weight record cannot be read.
    pub fn from_pretrained(
        pretrained: impl AsRef<Path>,
        config: TrainerConfig,
        model: M,
        optimizer: O,
        criterion: Criterion<B>,
        loaders: Loaders<B>,
        device: &B::Device,
    ) -> UNet3DResult<Self> {
        info!(weights = %pretrained.as_ref().display(), "loading pretrained weights");
        let model = model
            .load_file(pretrained.as_ref(), &CompactRecorder::new(), device)
            .map_err(|e| UNet3DError::Checkpoint {
                message: format!("failed to load pretrained weights: {e}"),
            })?;
        Ok(Self::new(config, model, optimizer, criterion, loaders))
    }

    /// Trains until an epoch signals termination or the epoch limit is
    /// reached.
    ///
    /// # Errors
    ///
    /// Fails only on checkpoint I/O errors; both normal termination
    /// paths (early stopping, iteration limit) are reported through the
    /// logs.
    pub fn fit(&mut self) -> UNet3DResult<()> {
        for _ in self.state.num_epoch..self.config.max_num_epochs {
            let should_terminate = self.train_epoch()?;
            if should_terminate {
                break;
            }
            self.state.num_epoch += 1;
        }
        Ok(())
    }

    /// Trains the model for one epoch.
    ///
    /// Returns `true` if the training should be terminated immediately,
    /// `false` otherwise.
    pub fn train_epoch(&mut self) -> UNet3DResult<bool> {
        let mut train_losses = RunningAverage::new();
        let mut train_accuracy = RunningAcc::new();

        let loader = self.loaders.train.clone();
        for batch in loader.iter() {
            let (input, target, aux_target) = batch.into_parts();
            let batch_size = input.dims()[0];

            let output = self.model.forward(input);
            let mut loss = self.criterion.forward(output.prediction.clone(), &target);
            for aux in &output.deep_outputs {
                loss = loss
                    + self
                        .criterion
                        .forward(aux.clone(), &aux_target)
                        .mul_scalar(DEEP_SUPERVISION_WEIGHT);
            }
            let loss_value = loss.clone().into_scalar().to_f64();

            // compute gradients and update parameters
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);
            self.state.num_iterations += 1;

            let num_classes = output.prediction.dims()[1];
            let stats = self
                .scorer
                .score(output.prediction.detach(), target.to_mask(num_classes, None));
            train_losses.update(loss_value, batch_size);
            train_accuracy.update(&stats);

            if self.state.num_iterations % self.config.log_after_iters == 0 {
                info!(
                    loss = train_losses.average(),
                    sum_dice = train_accuracy.sum_dice(),
                    mean_dice = train_accuracy.mean_dice(),
                    "training stats"
                );
            }

            if self.state.num_iterations % self.config.validate_after_iters == 0 {
                let val_accuracy = self.validate();

                // remember best validation metric
                let is_best = self.is_best_val_accuracy(val_accuracy);

                self.save_checkpoint(is_best)?;

                if self.check_early_stopping(is_best) {
                    info!(
                        max_patience = self.state.max_patience,
                        "validation accuracy did not improve; early stopping"
                    );
                    return Ok(true);
                }
            }

            if self.state.num_iterations > self.config.max_num_iterations {
                info!(
                    max_num_iterations = self.config.max_num_iterations,
                    "maximum number of iterations exceeded; finishing training"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Runs a full validation pass and returns the mean Dice score.
    ///
    /// The pass runs on the inner-backend copy of the model produced by
    /// `valid()`, so no gradients are tracked and the training model is
    /// untouched on every exit path.
    pub fn validate(&mut self) -> f64 {
        info!(epoch = self.state.num_epoch, "validating");

        let model = self.model.valid();
        let mut val_accuracy = RunningAcc::new();

        let loader = self.loaders.val.clone();
        for batch in loader.iter() {
            let (input, target, _aux_target) = batch.into_parts();
            let output = model.forward(input);
            let num_classes = output.prediction.dims()[1];
            let stats = self
                .scorer
                .score(output.prediction, target.to_mask(num_classes, None));
            val_accuracy.update(&stats);
        }

        info!(
            sum_dice = val_accuracy.sum_dice(),
            mean_dice = val_accuracy.mean_dice(),
            iou = val_accuracy.iou(),
            precision = val_accuracy.precision(),
            recall = val_accuracy.recall(),
            "validation finished"
        );
        info!(
            best_val_accuracy = ?self.state.best_val_accuracy,
            "best validation accuracy so far"
        );

        val_accuracy.mean_dice()
    }

    /// Records `val_accuracy` if it strictly improves on the best seen
    /// so far. Ties do not count as improvement.
    fn is_best_val_accuracy(&mut self, val_accuracy: f64) -> bool {
        let is_best = self
            .state
            .best_val_accuracy
            .is_none_or(|best| val_accuracy > best);
        if is_best {
            info!(val_accuracy, "saving new best validation accuracy");
            self.state.best_val_accuracy = Some(val_accuracy);
        }
        is_best
    }

    /// Checks patience and adjusts the learning rate if necessary.
    ///
    /// Returns `true` if the training should be terminated.
    fn check_early_stopping(&mut self, best_model_found: bool) -> bool {
        if best_model_found {
            self.state.patience = self.state.max_patience;
        } else {
            self.state.patience = self.state.patience.saturating_sub(1);
            if self.state.patience == 0 {
                return true;
            }
            // decay the learning rate when reaching half of max_patience
            if self.state.patience == self.state.max_patience / 2 {
                self.adjust_learning_rate();
            }
        }
        false
    }

    /// Multiplies the learning rate by the configured decay rate.
    fn adjust_learning_rate(&mut self) {
        let old_lr = self.learning_rate;
        assert!(old_lr > 0.0, "learning rate must be positive before decay");
        let new_lr = self.config.lr_decay_rate * old_lr;
        info!(old_lr, new_lr, "changing learning rate");
        self.learning_rate = new_lr;
    }

    /// Persists the `last` checkpoint set, plus a `best` duplicate when
    /// the validation metric improved.
    fn save_checkpoint(&self, is_best: bool) -> UNet3DResult<()> {
        std::fs::create_dir_all(self.paths.dir()).map_err(|e| UNet3DError::Checkpoint {
            message: format!("failed to create {}: {e}", self.paths.dir().display()),
        })?;

        let mut meta = CheckpointMeta {
            state: self.state.clone(),
            max_num_epochs: self.config.max_num_epochs,
            max_num_iterations: self.config.max_num_iterations,
            validate_after_iters: self.config.validate_after_iters,
            log_after_iters: self.config.log_after_iters,
        };
        // Resumption starts at the epoch after the one being saved.
        meta.state.num_epoch = self.state.num_epoch + 1;

        self.write_checkpoint_set(
            &meta,
            &self.paths.last_state(),
            self.paths.last_model(),
            self.paths.last_optimizer(),
        )?;
        if is_best {
            self.write_checkpoint_set(
                &meta,
                &self.paths.best_state(),
                self.paths.best_model(),
                self.paths.best_optimizer(),
            )?;
        }
        Ok(())
    }

    fn write_checkpoint_set(
        &self,
        meta: &CheckpointMeta,
        state_path: &Path,
        model_path: std::path::PathBuf,
        optimizer_path: std::path::PathBuf,
    ) -> UNet3DResult<()> {
        checkpoint::write_meta_atomic(state_path, meta)?;
        self.model
            .clone()
            .save_file(model_path, &CompactRecorder::new())
            .map_err(|e| UNet3DError::Checkpoint {
                message: format!("failed to save model record: {e}"),
            })?;
        CompactRecorder::new()
            .record(self.optimizer.to_record(), optimizer_path)
            .map_err(|e| UNet3DError::Checkpoint {
                message: format!("failed to save optimizer record: {e}"),
            })?;
        Ok(())
    }

    /// The current schedule state.
    pub const fn state(&self) -> &TrainerState {
        &self.state
    }

    /// The current (possibly decayed) learning rate.
    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// The trained model, consuming the trainer.
    pub fn into_model(self) -> M {
        self.model
    }
}

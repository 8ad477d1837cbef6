/// Trainer capability and the AdamW classifier trainer
use candle_core::{DType, Tensor, D};
use candle_nn::{loss, ops, AdamW, Optimizer, ParamsAdamW};

use super::early_stopping::{EarlyStopping, StoppingAction};
use super::metrics::{EvalMetrics, FitSummary};
use crate::config::ActiveLearningConfig;
use crate::data::{BatchDataLoader, DataProvider};
use crate::models::Model;
use crate::{ALError, Result};

/// What the round controller needs from a training loop
pub trait Trainer {
    /// Train `model` on the labeled pool until the stopping criterion fires
    ///
    /// Reports `TrainingDiverged` on a non-finite loss.
    fn fit(&mut self, model: &mut dyn Model, data: &DataProvider<'_>) -> Result<FitSummary>;

    /// Loss and accuracy on the validation and test pools
    fn evaluate(&mut self, model: &dyn Model, data: &DataProvider<'_>) -> Result<EvalMetrics>;

    /// Forget the stopping criterion's best score and history
    fn reset_stopping_criterion(&mut self);
}

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Weight decay
    pub weight_decay: f64,
    /// Epochs before early stopping may end a fit
    pub min_epochs: usize,
    /// Hard cap on epochs (None = unbounded)
    pub max_epochs: Option<usize>,
    /// Epochs without improvement before stopping
    pub early_stopping_patience: usize,
    /// Minimum improvement that resets patience
    pub min_delta: f32,
    /// Weight of the loss-prediction objective
    pub learning_loss_factor: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 2e-4,
            weight_decay: 0.01,
            min_epochs: 25,
            max_epochs: None,
            early_stopping_patience: 10,
            min_delta: 0.0,
            learning_loss_factor: 0.1,
        }
    }
}

impl From<&ActiveLearningConfig> for TrainingConfig {
    fn from(config: &ActiveLearningConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            min_epochs: config.min_epochs,
            max_epochs: config.max_epochs,
            early_stopping_patience: config.early_stopping_patience,
            learning_loss_factor: config.learning_loss_factor,
            ..Default::default()
        }
    }
}

/// Mini-batch AdamW trainer for classifiers
///
/// Monitors validation classification loss (training loss when the
/// validation pool is empty). The optimizer is rebuilt on every fit so no
/// moment estimates leak from one round into the next.
pub struct ClassifierTrainer {
    config: TrainingConfig,
    early_stopping: EarlyStopping,
    step: usize,
}

impl ClassifierTrainer {
    /// Create new trainer
    pub fn new(config: TrainingConfig) -> Self {
        let early_stopping = EarlyStopping::new(config.early_stopping_patience, config.min_delta);
        Self {
            config,
            early_stopping,
            step: 0,
        }
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    /// Total optimizer steps taken
    pub fn step(&self) -> usize {
        self.step
    }

    /// Compute loss for a batch
    ///
    /// Returns (objective to minimise, classification loss).
    fn compute_loss(
        &self,
        model: &dyn Model,
        inputs: &Tensor,
        targets: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        let logits = model.forward(inputs)?;
        let classification = loss::cross_entropy(&logits, targets)?;

        if !model.supports_loss_prediction() || self.config.learning_loss_factor == 0.0 {
            return Ok((classification.clone(), classification));
        }

        // Loss head regresses the (detached) per-example classification loss
        let log_probs = ops::log_softmax(&logits, D::Minus1)?;
        let per_example = log_probs
            .gather(&targets.unsqueeze(1)?, 1)?
            .squeeze(1)?
            .neg()?
            .detach();
        let predicted = model.predict_loss(inputs)?;
        let loss_prediction = loss::mse(&predicted, &per_example)?;

        let objective = (&classification + (loss_prediction * self.config.learning_loss_factor)?)?;
        Ok((objective, classification))
    }

    /// Train for one epoch, returning the mean classification loss
    fn train_epoch(
        &mut self,
        model: &dyn Model,
        optimizer: &mut AdamW,
        dataloader: &mut dyn BatchDataLoader,
        data: &DataProvider<'_>,
        epoch: usize,
    ) -> Result<f32> {
        let mut total_loss = 0.0f32;
        let mut num_batches = 0usize;

        dataloader.reset();

        while let Some(batch) = dataloader.next_batch(data.device())? {
            let (objective, classification) = self.compute_loss(model, &batch.inputs, &batch.targets)?;
            let loss_val = classification.to_scalar::<f32>()?;
            let objective_val = objective.to_scalar::<f32>()?;

            if !loss_val.is_finite() || !objective_val.is_finite() {
                return Err(ALError::TrainingDiverged {
                    epoch,
                    loss: if loss_val.is_finite() { objective_val } else { loss_val },
                });
            }

            optimizer.backward_step(&objective)?;
            self.step += 1;

            total_loss += loss_val;
            num_batches += 1;
        }

        Ok(total_loss / num_batches.max(1) as f32)
    }

    /// Mean loss and accuracy over a loader (None when it is empty)
    fn evaluate_loader(
        &self,
        model: &dyn Model,
        dataloader: &mut dyn BatchDataLoader,
        data: &DataProvider<'_>,
    ) -> Result<Option<(f32, f32)>> {
        let mut loss_sum = 0.0f64;
        let mut correct = 0.0f64;
        let mut count = 0usize;

        dataloader.reset();
        while let Some(batch) = dataloader.next_batch(data.device())? {
            let logits = model.forward(&batch.inputs)?;
            let batch_loss = loss::cross_entropy(&logits, &batch.targets)?.to_scalar::<f32>()?;
            let hits = logits
                .argmax(D::Minus1)?
                .eq(&batch.targets)?
                .to_dtype(DType::F32)?
                .sum_all()?
                .to_scalar::<f32>()?;

            loss_sum += batch_loss as f64 * batch.len() as f64;
            correct += hits as f64;
            count += batch.len();
        }

        if count == 0 {
            return Ok(None);
        }
        Ok(Some((
            (loss_sum / count as f64) as f32,
            (correct / count as f64) as f32,
        )))
    }
}

impl Trainer for ClassifierTrainer {
    fn fit(&mut self, model: &mut dyn Model, data: &DataProvider<'_>) -> Result<FitSummary> {
        let mut dataloader = data.train_batches();
        if dataloader.is_empty() {
            return Err(ALError::Config("no labeled examples to train on".to_string()));
        }

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.trainable_vars(), params)?;

        log::info!(
            "Training on {} labeled examples ({} batches/epoch)",
            dataloader.len(),
            dataloader.num_batches()
        );

        let mut validation = data.validation_batches();
        let mut epoch = 0;
        let mut train_loss: f32;
        let mut stopped_early = false;

        loop {
            train_loss = self.train_epoch(&*model, &mut optimizer, &mut dataloader, data, epoch)?;

            let monitored = match self.evaluate_loader(&*model, &mut validation, data)? {
                Some((val_loss, _)) => val_loss,
                None => train_loss,
            };
            if !monitored.is_finite() {
                return Err(ALError::TrainingDiverged {
                    epoch,
                    loss: monitored,
                });
            }

            let action = self.early_stopping.observe(monitored);
            epoch += 1;

            log::debug!(
                "Epoch {} complete: train_loss={:.4}, monitored={:.4}, step={}",
                epoch,
                train_loss,
                monitored,
                self.step
            );

            if self.config.max_epochs.is_some_and(|max| epoch >= max) {
                break;
            }
            if action == StoppingAction::Stop && epoch >= self.config.min_epochs {
                stopped_early = true;
                break;
            }
        }

        log::info!(
            "Training complete after {} epochs: train_loss={:.4}, best={:?}",
            epoch,
            train_loss,
            self.early_stopping.best_score()
        );

        Ok(FitSummary {
            epochs: epoch,
            train_loss,
            best_score: self.early_stopping.best_score(),
            stopped_early,
        })
    }

    fn evaluate(&mut self, model: &dyn Model, data: &DataProvider<'_>) -> Result<EvalMetrics> {
        let validation = self.evaluate_loader(model, &mut data.validation_batches(), data)?;
        let test = self.evaluate_loader(model, &mut data.test_batches(), data)?;

        Ok(EvalMetrics {
            validation_loss: validation.map(|(l, _)| l),
            validation_accuracy: validation.map(|(_, a)| a),
            test_loss: test.map(|(l, _)| l),
            test_accuracy: test.map(|(_, a)| a),
        })
    }

    fn reset_stopping_criterion(&mut self) {
        self.early_stopping.reset();
    }
}

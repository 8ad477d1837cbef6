//! Round controller
//!
//! Drives the active learning loop: for each round, reset the model, clear
//! the stopping criterion, train on the labeled pool, evaluate, and (except
//! on the last round) label the examples the acquisition strategy proposes.

use candle_core::Device;
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;

use crate::config::ActiveLearningConfig;
use crate::data::{ClassBalanceSpec, DataProvider, Dataset, PoolKind, PoolPartition, PoolSizes};
use crate::models::Model;
use crate::strategy::{AcquisitionContext, AcquisitionStrategy};
use crate::training::{EvalMetrics, FitSummary, LogSink, MetricsSink, RoundMetrics, Trainer};
use crate::{ALError, Result};

/// Where the controller is in the current round
///
/// `Idle → TrainReady → Trained → Evaluated → Labeling → TrainReady … → Done`.
/// A failed round falls back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Pools split, no round in flight
    Idle,
    /// Weights reset and stopping criterion cleared
    TrainReady,
    /// Trainer finished
    Trained,
    /// Metrics recorded
    Evaluated,
    /// Acquired examples labeled; the next round can start
    Labeling,
    /// Final round complete
    Done,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Snapshot taken when a round starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundState {
    /// 1-based round number
    pub round: usize,
    pub labeled: usize,
    pub unlabeled: usize,
    /// Best monitored score of this round, once training is done
    pub best_score: Option<f32>,
}

/// Outcome of one round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: usize,
    /// Labeled pool size the model was trained on
    pub labeled: usize,
    pub fit: FitSummary,
    pub eval: EvalMetrics,
    /// Indices labeled at the end of the round (empty on the last round)
    pub acquired: Vec<usize>,
}

/// A round failure with the context needed to diagnose or resume it
#[derive(Debug, thiserror::Error)]
#[error("round {round} failed (labeled={labeled}, unlabeled={unlabeled}): {source}")]
pub struct RoundError {
    pub round: usize,
    pub labeled: usize,
    pub unlabeled: usize,
    pub source: ALError,
}

impl RoundError {
    /// Whether the trainer reported a non-finite loss
    pub fn is_divergence(&self) -> bool {
        matches!(self.source, ALError::TrainingDiverged { .. })
    }
}

/// Owns the pools, model, trainer and strategy of one active learning run
pub struct RoundController<'a, M: Model, T: Trainer> {
    config: ActiveLearningConfig,
    dataset: &'a dyn Dataset,
    pools: PoolPartition,
    model: M,
    trainer: T,
    strategy: Box<dyn AcquisitionStrategy>,
    sink: Box<dyn MetricsSink>,
    device: Device,
    rng: StdRng,
    round: usize,
    phase: RoundPhase,
}

impl<'a, M: Model, T: Trainer> RoundController<'a, M, T> {
    /// Split the dataset, balance the unlabeled pool and label the initial set
    ///
    /// Setup failures are reported as round 0 with the pool sizes reached.
    pub fn prepare(
        config: ActiveLearningConfig,
        dataset: &'a dyn Dataset,
        model: M,
        trainer: T,
        strategy: Box<dyn AcquisitionStrategy>,
        mut rng: StdRng,
    ) -> std::result::Result<Self, RoundError> {
        let mut pools = PoolPartition::default();
        if let Err(source) = Self::partition(&config, dataset, &mut pools, &mut rng) {
            log::error!("Setup failed: {}", source);
            return Err(Self::setup_error(&pools, source));
        }

        Self::from_pools(config, dataset, pools, model, trainer, strategy, rng)
    }

    fn partition(
        config: &ActiveLearningConfig,
        dataset: &dyn Dataset,
        pools: &mut PoolPartition,
        rng: &mut StdRng,
    ) -> Result<()> {
        config.validate()?;

        let sizes = PoolSizes::from_fractions(dataset.len(), config.test_split, config.train_split);
        *pools = PoolPartition::split(dataset.len(), sizes, rng)?;

        let spec = ClassBalanceSpec::half_classes(dataset.num_classes(), config.class_balance)?;
        pools.balance(PoolKind::Unlabeled, &spec, dataset, rng)?;

        // Fail now rather than in a late round
        let needed = config.total_labels();
        let available = pools.unlabeled().len();
        if needed > available {
            return Err(ALError::InsufficientPool {
                requested: needed,
                available,
            });
        }

        pools.label_randomly(config.initial_labels, rng)?;
        Ok(())
    }

    fn setup_error(pools: &PoolPartition, source: ALError) -> RoundError {
        RoundError {
            round: 0,
            labeled: pools.labeled().len(),
            unlabeled: pools.unlabeled().len(),
            source,
        }
    }

    /// Resume from an existing partition
    pub fn from_pools(
        config: ActiveLearningConfig,
        dataset: &'a dyn Dataset,
        pools: PoolPartition,
        model: M,
        trainer: T,
        strategy: Box<dyn AcquisitionStrategy>,
        rng: StdRng,
    ) -> std::result::Result<Self, RoundError> {
        if let Err(source) = config.validate() {
            return Err(Self::setup_error(&pools, source));
        }

        if strategy.name() != config.acquisition_method.as_str() {
            log::warn!(
                "Strategy {} does not match configured method {}",
                strategy.name(),
                config.acquisition_method
            );
        }
        if model.num_classes() < dataset.num_classes() {
            let source = ALError::Config(format!(
                "model predicts {} classes but the dataset has {}",
                model.num_classes(),
                dataset.num_classes()
            ));
            return Err(Self::setup_error(&pools, source));
        }

        let sizes = pools.sizes();
        log::info!(
            "Prepared {}: labeled={}, unlabeled={}, validation={}, test={}",
            config.run_name(),
            sizes.labeled,
            sizes.unlabeled,
            sizes.validation,
            sizes.test
        );

        Ok(Self {
            config,
            dataset,
            pools,
            model,
            trainer,
            strategy,
            sink: Box::new(LogSink),
            device: Device::Cpu,
            rng,
            round: 1,
            phase: RoundPhase::Idle,
        })
    }

    /// Send round metrics to `sink` instead of the log
    pub fn with_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn config(&self) -> &ActiveLearningConfig {
        &self.config
    }

    pub fn pools(&self) -> &PoolPartition {
        &self.pools
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Number of the next round to run (1-based)
    pub fn round(&self) -> usize {
        self.round
    }

    fn state(&self) -> RoundState {
        RoundState {
            round: self.round,
            labeled: self.pools.labeled().len(),
            unlabeled: self.pools.unlabeled().len(),
            best_score: None,
        }
    }

    /// Run one reset → train → evaluate → label cycle
    ///
    /// On failure the pools are left as they were, the phase returns to
    /// `Idle` and the next call retries the same round.
    pub fn run_round(&mut self) -> std::result::Result<RoundReport, RoundError> {
        let mut state = self.state();

        if self.phase == RoundPhase::Done {
            return Err(Self::round_error(
                &state,
                ALError::Config(format!(
                    "all {} rounds have already run",
                    self.config.labeling_steps
                )),
            ));
        }

        match self.execute(&mut state) {
            Ok(report) => Ok(report),
            Err(source) => {
                self.phase = RoundPhase::Idle;
                if matches!(source, ALError::TrainingDiverged { .. }) {
                    log::warn!("Round {} diverged: {}", state.round, source);
                } else {
                    log::error!("Round {} failed: {}", state.round, source);
                }
                Err(Self::round_error(&state, source))
            }
        }
    }

    /// Run rounds until `Done`
    pub fn run(&mut self) -> std::result::Result<Vec<RoundReport>, RoundError> {
        if self.phase == RoundPhase::Done {
            return Err(Self::round_error(
                &self.state(),
                ALError::Config("run already finished".to_string()),
            ));
        }

        let mut reports = Vec::with_capacity(self.config.labeling_steps);
        while self.phase != RoundPhase::Done {
            reports.push(self.run_round()?);
        }
        Ok(reports)
    }

    fn round_error(state: &RoundState, source: ALError) -> RoundError {
        RoundError {
            round: state.round,
            labeled: state.labeled,
            unlabeled: state.unlabeled,
            source,
        }
    }

    fn execute(&mut self, state: &mut RoundState) -> Result<RoundReport> {
        let last_round = state.round >= self.config.labeling_steps;
        log::info!(
            "Round {}/{}: labeled={}, unlabeled={}",
            state.round,
            self.config.labeling_steps,
            state.labeled,
            state.unlabeled
        );

        // Weights first, then the stopping criterion, then training
        self.model.reset()?;
        self.trainer.reset_stopping_criterion();
        self.phase = RoundPhase::TrainReady;

        let data = DataProvider::new(self.dataset, &self.pools, self.device.clone())
            .with_batch_sizes(self.config.train_batch_size, self.config.eval_batch_size)
            .with_seed(Some(self.rng.gen()));

        let fit = self.trainer.fit(&mut self.model, &data)?;
        state.best_score = fit.best_score;
        self.phase = RoundPhase::Trained;

        let eval = self.trainer.evaluate(&self.model, &data)?;
        self.sink.record(&RoundMetrics {
            run: self.config.run_name(),
            round: state.round,
            labeled: state.labeled,
            epochs: fit.epochs,
            train_loss: fit.train_loss,
            validation_loss: eval.validation_loss,
            validation_accuracy: eval.validation_accuracy,
            test_loss: eval.test_loss,
            test_accuracy: eval.test_accuracy,
        })?;
        self.phase = RoundPhase::Evaluated;

        let acquired = if last_round {
            Vec::new()
        } else {
            let ctx = AcquisitionContext {
                model: &self.model,
                data: &data,
            };
            let picks = self.strategy.select(&ctx, self.config.labeling_budget)?;
            if picks.len() != self.config.labeling_budget {
                return Err(ALError::Model(format!(
                    "{} proposed {} examples, expected {}",
                    self.strategy.name(),
                    picks.len(),
                    self.config.labeling_budget
                )));
            }
            picks
        };

        if last_round {
            self.phase = RoundPhase::Done;
            log::info!("Run {} complete after {} rounds", self.config.run_name(), state.round);
        } else {
            self.pools.label(&acquired)?;
            self.phase = RoundPhase::Labeling;
            log::info!(
                "Round {}: {} labeled {} examples (best score {:?})",
                state.round,
                self.strategy.name(),
                acquired.len(),
                state.best_score
            );
        }
        self.round += 1;

        Ok(RoundReport {
            round: state.round,
            labeled: state.labeled,
            fit,
            eval,
            acquired,
        })
    }
}

//! Active learning on Candle
//!
//! Trains a classifier on a growing labeled pool, evaluates it, and asks an
//! acquisition strategy which unlabeled examples to label next.
//!
//! # Architecture
//!
//! - **Pools**: labeled / unlabeled / validation / test index sets over one dataset
//! - **Strategies**: random, entropy-based, class-balanced, core-set, learning-loss
//! - **Controller**: reset → train → evaluate → label, for a fixed number of rounds
//!
//! # Example
//!
//! ```ignore
//! use active_learning::{ActiveLearningConfig, RoundController};
//!
//! let config = ActiveLearningConfig::default();
//! let mut controller = RoundController::prepare(config, &dataset, model, trainer, strategy, rng)?;
//! let reports = controller.run()?;
//! ```

pub mod config;
pub mod controller;
pub mod data;
pub mod models;
pub mod strategy;
pub mod training;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub use config::ActiveLearningConfig;
pub use controller::{RoundController, RoundError, RoundPhase, RoundReport};
pub use data::{Dataset, PoolPartition};
pub use models::{MlpClassifier, Model};
pub use strategy::{AcquisitionMethod, AcquisitionStrategy};
pub use training::{ClassifierTrainer, Trainer};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum ALError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid split: pool sizes sum to {requested} but the dataset has {available} examples")]
    InvalidSplit { requested: usize, available: usize },

    #[error("Invalid index {index}: not a member of the unlabeled pool")]
    InvalidIndex { index: usize },

    #[error("Insufficient pool: requested {requested} examples but only {available} are unlabeled")]
    InsufficientPool { requested: usize, available: usize },

    #[error("Balancing left the {pool} pool without members for class(es) {classes:?}")]
    EmptyBalance { pool: String, classes: Vec<u32> },

    #[error("Model does not support {0}")]
    UnsupportedModel(&'static str),

    #[error("Training diverged at epoch {epoch}: loss={loss}")]
    TrainingDiverged { epoch: usize, loss: f32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NumPy error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),
}

pub type Result<T> = std::result::Result<T, ALError>;

//! Acquisition strategies
//!
//! A strategy looks at the current model and the unlabeled pool and proposes
//! which examples to label next. It only reads the pools; applying the
//! proposal is the round controller's job.

pub mod core_set;
pub mod learning_loss;
pub mod random;
pub mod uncertainty;

pub use core_set::CoreSet;
pub use learning_loss::LearningLoss;
pub use random::RandomSampling;
pub use uncertainty::{entropy, BalancedUncertainty, Uncertainty};

use std::fmt;
use std::str::FromStr;

use crate::config::ActiveLearningConfig;
use crate::data::{Batch, DataProvider};
use crate::models::Model;
use crate::{ALError, Result};

/// Available acquisition methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionMethod {
    Random,
    Uncertainty,
    UncertaintyBalanced,
    UncertaintyBalancedGreedy,
    LearningLoss,
    CoreSet,
    CoreSetGreedy,
}

impl AcquisitionMethod {
    pub const ALL: [AcquisitionMethod; 7] = [
        AcquisitionMethod::Random,
        AcquisitionMethod::Uncertainty,
        AcquisitionMethod::UncertaintyBalanced,
        AcquisitionMethod::UncertaintyBalancedGreedy,
        AcquisitionMethod::LearningLoss,
        AcquisitionMethod::CoreSet,
        AcquisitionMethod::CoreSetGreedy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMethod::Random => "random",
            AcquisitionMethod::Uncertainty => "uncertainty",
            AcquisitionMethod::UncertaintyBalanced => "uncertainty-balanced",
            AcquisitionMethod::UncertaintyBalancedGreedy => "uncertainty-balanced-greedy",
            AcquisitionMethod::LearningLoss => "learning-loss",
            AcquisitionMethod::CoreSet => "core-set",
            AcquisitionMethod::CoreSetGreedy => "core-set-greedy",
        }
    }

    /// Whether the model needs a loss-prediction head
    pub fn needs_loss_head(&self) -> bool {
        matches!(self, AcquisitionMethod::LearningLoss)
    }
}

impl fmt::Display for AcquisitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcquisitionMethod {
    type Err = ALError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                ALError::Config(format!(
                    "Invalid acquisition method: {}. Must be one of {:?}",
                    s,
                    Self::ALL.map(|m| m.as_str())
                ))
            })
    }
}

/// Read-only inputs to a selection
pub struct AcquisitionContext<'a, 'd> {
    pub model: &'a dyn Model,
    pub data: &'a DataProvider<'d>,
}

/// Policy choosing which unlabeled examples to label next
pub trait AcquisitionStrategy {
    fn name(&self) -> &'static str;

    /// Propose `count` distinct members of the unlabeled pool
    ///
    /// Fails with `InsufficientPool` if fewer than `count` are unlabeled.
    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>>;
}

/// Build the strategy named by `config.acquisition_method`
pub fn build(config: &ActiveLearningConfig) -> Box<dyn AcquisitionStrategy> {
    match config.acquisition_method {
        AcquisitionMethod::Random => Box::new(RandomSampling::new(config.seed)),
        AcquisitionMethod::Uncertainty => Box::new(Uncertainty),
        AcquisitionMethod::UncertaintyBalanced => {
            Box::new(BalancedUncertainty::new(config.class_balance_factor))
        }
        AcquisitionMethod::UncertaintyBalancedGreedy => {
            Box::new(BalancedUncertainty::greedy(config.class_balance_factor))
        }
        AcquisitionMethod::LearningLoss => Box::new(LearningLoss),
        AcquisitionMethod::CoreSet => Box::new(CoreSet::new()),
        AcquisitionMethod::CoreSetGreedy => Box::new(CoreSet::greedy()),
    }
}

pub(crate) fn check_count(ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<()> {
    let available = ctx.data.pools().unlabeled().len();
    if count > available {
        return Err(ALError::InsufficientPool {
            requested: count,
            available,
        });
    }
    Ok(())
}

/// Score every unlabeled example batch by batch
///
/// Returns the unlabeled indices in pool order alongside their scores.
pub(crate) fn score_unlabeled<F>(
    ctx: &AcquisitionContext<'_, '_>,
    mut score: F,
) -> Result<(Vec<usize>, Vec<f32>)>
where
    F: FnMut(&Batch) -> Result<Vec<f32>>,
{
    let mut loader = ctx.data.unlabeled_batches();
    let mut indices = Vec::with_capacity(loader.len());
    let mut scores = Vec::with_capacity(loader.len());

    while let Some(batch) = loader.next_batch(ctx.data.device())? {
        let batch_scores = score(&batch)?;
        if batch_scores.len() != batch.len() {
            return Err(ALError::Model(format!(
                "expected {} scores, got {}",
                batch.len(),
                batch_scores.len()
            )));
        }
        indices.extend_from_slice(&batch.indices);
        scores.extend(batch_scores);
    }

    Ok((indices, scores))
}

/// Positions ordered by descending score, ties kept in input order
///
/// NaN scores sort last.
pub(crate) fn rank_descending(scores: &[f32]) -> Vec<usize> {
    let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| key(scores[b]).total_cmp(&key(scores[a])));
    order
}

/// The `count` highest-scoring indices
pub(crate) fn top_k(indices: &[usize], scores: &[f32], count: usize) -> Vec<usize> {
    rank_descending(scores)
        .into_iter()
        .take(count)
        .map(|pos| indices[pos])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for method in AcquisitionMethod::ALL {
            assert_eq!(method.as_str().parse::<AcquisitionMethod>().unwrap(), method);
        }
        assert!("entropy".parse::<AcquisitionMethod>().is_err());
    }

    #[test]
    fn test_method_serde_names() {
        let json = serde_json::to_string(&AcquisitionMethod::UncertaintyBalancedGreedy).unwrap();
        assert_eq!(json, "\"uncertainty-balanced-greedy\"");
    }

    #[test]
    fn test_rank_descending_is_stable() {
        let scores = [0.5, 0.9, 0.5, f32::NAN, 0.9, 0.1];
        assert_eq!(rank_descending(&scores), vec![1, 4, 0, 2, 5, 3]);
    }

    #[test]
    fn test_top_k_maps_positions() {
        let indices = [40, 41, 42, 43];
        let scores = [0.1, 0.7, 0.3, 0.7];
        assert_eq!(top_k(&indices, &scores, 3), vec![41, 43, 42]);
    }

    #[test]
    fn test_build_covers_every_method() {
        for method in AcquisitionMethod::ALL {
            let config = ActiveLearningConfig {
                acquisition_method: method,
                ..Default::default()
            };
            assert_eq!(build(&config).name(), method.as_str());
        }
    }
}

/// Entropy-based acquisition, plain and class-balanced
use candle_core::{Tensor, D};
use candle_nn::ops;

use super::{check_count, rank_descending, score_unlabeled, top_k, AcquisitionContext, AcquisitionStrategy};
use crate::data::PoolKind;
use crate::Result;

/// Predictive entropy `-Σ p ln p` with `0 ln 0 := 0`
pub fn entropy(probs: &[f32]) -> f32 {
    -probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f32>()
}

/// Entropy of softmax(scores) per row: [batch, classes] -> batch values
pub fn predictive_entropy(scores: &Tensor) -> Result<Vec<f32>> {
    let probs = ops::softmax(scores, D::Minus1)?.to_vec2::<f32>()?;
    Ok(probs.iter().map(|row| entropy(row)).collect())
}

/// Highest predictive entropy first
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncertainty;

impl AcquisitionStrategy for Uncertainty {
    fn name(&self) -> &'static str {
        "uncertainty"
    }

    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>> {
        check_count(ctx, count)?;

        let (indices, scores) =
            score_unlabeled(ctx, |batch| predictive_entropy(&ctx.model.forward(&batch.inputs)?))?;
        Ok(top_k(&indices, &scores, count))
    }
}

/// Entropy ranking under per-class quotas
///
/// Unlabeled examples are assigned to their predicted class. Quotas favour
/// classes that are rare in the labeled pool: class c gets a share
/// proportional to `(1 / (n_c + 1))^factor`, where `n_c` is its labeled
/// count. `factor = 0` gives uniform quotas.
#[derive(Debug, Clone, Copy)]
pub struct BalancedUncertainty {
    factor: f32,
    greedy: bool,
}

impl BalancedUncertainty {
    /// Exact quota filling
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            greedy: false,
        }
    }

    /// Single pass in global entropy order with quotas as caps
    pub fn greedy(factor: f32) -> Self {
        Self {
            factor,
            greedy: true,
        }
    }
}

/// Split `total` proportionally to `weights` (largest remainder method)
///
/// Ties in the remainder go to the lower class index. Zero weights get zero.
pub fn apportion(weights: &[f64], total: usize) -> Vec<usize> {
    let sum: f64 = weights.iter().sum();
    if total == 0 || sum <= 0.0 {
        return vec![0; weights.len()];
    }

    let raw: Vec<f64> = weights.iter().map(|w| w / sum * total as f64).collect();
    let mut shares: Vec<usize> = raw.iter().map(|r| r.floor() as usize).collect();
    let assigned: usize = shares.iter().sum();

    let mut by_remainder: Vec<usize> = (0..weights.len()).filter(|&c| weights[c] > 0.0).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = raw[a] - raw[a].floor();
        let rb = raw[b] - raw[b].floor();
        rb.total_cmp(&ra)
    });
    for &c in by_remainder.iter().cycle().take(total.saturating_sub(assigned)) {
        shares[c] += 1;
    }

    shares
}

impl BalancedUncertainty {
    fn class_weights(&self, labeled_counts: &[usize]) -> Vec<f64> {
        labeled_counts
            .iter()
            .map(|&n| (1.0 / (n as f64 + 1.0)).powf(self.factor as f64))
            .collect()
    }

    /// Class by class: each takes its best candidates up to its quota, and
    /// shortfalls are re-apportioned among classes with candidates left
    fn fill_exact(&self, weights: &[f64], buckets: &[Vec<usize>], count: usize) -> Vec<usize> {
        let mut taken: Vec<usize> = apportion(weights, count)
            .into_iter()
            .zip(buckets)
            .map(|(quota, bucket)| quota.min(bucket.len()))
            .collect();

        let mut shortfall = count - taken.iter().sum::<usize>();
        while shortfall > 0 {
            let spare_weights: Vec<f64> = weights
                .iter()
                .enumerate()
                .map(|(c, &w)| if buckets[c].len() > taken[c] { w.max(f64::MIN_POSITIVE) } else { 0.0 })
                .collect();
            let extra = apportion(&spare_weights, shortfall);

            let mut progressed = 0;
            for c in 0..buckets.len() {
                let add = extra[c].min(buckets[c].len() - taken[c]);
                taken[c] += add;
                progressed += add;
            }
            if progressed == 0 {
                break;
            }
            shortfall -= progressed;
        }

        buckets
            .iter()
            .zip(&taken)
            .flat_map(|(bucket, &n)| bucket[..n].iter().copied())
            .collect()
    }

    /// Walk the global ranking, taking items whose class is under its cap;
    /// leftover slots go to the next best items regardless of class
    fn fill_greedy(&self, weights: &[f64], ranking: &[usize], predictions: &[usize], count: usize) -> Vec<usize> {
        let caps = apportion(weights, count);
        let mut per_class = vec![0usize; caps.len()];
        let mut chosen = vec![false; ranking.len()];
        let mut picks = Vec::with_capacity(count);

        for &pos in ranking {
            if picks.len() == count {
                break;
            }
            let class = predictions[pos];
            if per_class[class] < caps[class] {
                per_class[class] += 1;
                chosen[pos] = true;
                picks.push(pos);
            }
        }

        for &pos in ranking {
            if picks.len() == count {
                break;
            }
            if !chosen[pos] {
                chosen[pos] = true;
                picks.push(pos);
            }
        }

        picks
    }
}

impl AcquisitionStrategy for BalancedUncertainty {
    fn name(&self) -> &'static str {
        if self.greedy {
            "uncertainty-balanced-greedy"
        } else {
            "uncertainty-balanced"
        }
    }

    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>> {
        check_count(ctx, count)?;

        let mut predictions = Vec::new();
        let (indices, scores) = score_unlabeled(ctx, |batch| {
            let logits = ctx.model.forward(&batch.inputs)?;
            predictions.extend(
                logits
                    .argmax(D::Minus1)?
                    .to_vec1::<u32>()?
                    .into_iter()
                    .map(|c| c as usize),
            );
            predictive_entropy(&logits)
        })?;

        let mut labeled_counts = ctx
            .data
            .pools()
            .class_counts(PoolKind::Labeled, ctx.data.dataset());
        let num_classes = labeled_counts
            .len()
            .max(ctx.model.num_classes())
            .max(predictions.iter().max().map_or(0, |&c| c + 1));
        labeled_counts.resize(num_classes, 0);
        let weights = self.class_weights(&labeled_counts);

        let ranking = rank_descending(&scores);
        let positions = if self.greedy {
            self.fill_greedy(&weights, &ranking, &predictions, count)
        } else {
            let mut buckets = vec![Vec::new(); num_classes];
            for &pos in &ranking {
                buckets[predictions[pos]].push(pos);
            }
            self.fill_exact(&weights, &buckets, count)
        };

        // Report in global priority order
        let mut rank_of = vec![0usize; ranking.len()];
        for (rank, &pos) in ranking.iter().enumerate() {
            rank_of[pos] = rank;
        }
        let mut positions = positions;
        positions.sort_by_key(|&pos| rank_of[pos]);

        log::debug!(
            "{}: quotas from labeled counts {:?}",
            self.name(),
            labeled_counts
        );

        Ok(positions.into_iter().map(|pos| indices[pos]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataProvider;
    use crate::testing::{fixture, fixture_with_labels, IdentityModel};
    use crate::ALError;
    use candle_core::Device;

    #[test]
    fn test_entropy_uniform_is_log_k() {
        for k in [2usize, 3, 10] {
            let probs = vec![1.0 / k as f32; k];
            assert!((entropy(&probs) - (k as f32).ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_entropy_one_hot_is_zero() {
        assert_eq!(entropy(&[0.0, 1.0, 0.0]), 0.0);
        assert!(entropy(&[0.0, 0.0]).is_finite());
    }

    #[test]
    fn test_predictive_entropy_from_scores() -> Result<()> {
        let scores = Tensor::new(&[[0.0f32, 0.0, 0.0], [100.0, 0.0, 0.0]], &Device::Cpu)?;
        let h = predictive_entropy(&scores)?;
        assert!((h[0] - 3.0f32.ln()).abs() < 1e-5);
        assert!(h[1] < 1e-4);
        Ok(())
    }

    #[test]
    fn test_apportion() {
        assert_eq!(apportion(&[1.0, 1.0, 1.0], 7), vec![3, 2, 2]);
        assert_eq!(apportion(&[1.0, 3.0], 8), vec![2, 6]);
        assert_eq!(apportion(&[0.0, 1.0], 3), vec![0, 3]);
        assert_eq!(apportion(&[0.0, 0.0], 3), vec![0, 0]);
        assert_eq!(apportion(&[1.0, 1.0], 0), vec![0, 0]);
    }

    /// Rows: confident, uncertain, mid, uncertain (tie with row 1), confident
    fn rows() -> [[f32; 2]; 6] {
        [
            [5.0, 0.0],
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 0.0],
            [0.0, 5.0],
            [0.0, 0.0],
        ]
    }

    #[test]
    fn test_uncertainty_picks_highest_entropy_with_pool_order_ties() {
        // Unlabeled pool: rows 0..5 in order; row 5 is labeled
        let (dataset, pools) = fixture(&rows(), 2, 5);
        let data = DataProvider::new(&dataset, &pools, Device::Cpu).with_batch_sizes(8, 2);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        let picks = Uncertainty.select(&ctx, 3).unwrap();
        assert_eq!(picks, vec![1, 3, 2]);
    }

    #[test]
    fn test_uncertainty_is_idempotent() {
        let (dataset, pools) = fixture(&rows(), 2, 5);
        let data = DataProvider::new(&dataset, &pools, Device::Cpu).with_batch_sizes(8, 3);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        let first = Uncertainty.select(&ctx, 2).unwrap();
        let second = Uncertainty.select(&ctx, 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_uncertainty_batch_size_does_not_matter() {
        let (dataset, pools) = fixture(&rows(), 2, 5);
        let model = IdentityModel::new(2);

        let select = |eval_batch| {
            let data = DataProvider::new(&dataset, &pools, Device::Cpu).with_batch_sizes(8, eval_batch);
            let ctx = AcquisitionContext { model: &model, data: &data };
            Uncertainty.select(&ctx, 4).unwrap()
        };
        assert_eq!(select(1), select(100));
    }

    #[test]
    fn test_uncertainty_insufficient_pool() {
        let (dataset, pools) = fixture(&rows(), 2, 5);
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        assert!(matches!(
            Uncertainty.select(&ctx, 6),
            Err(ALError::InsufficientPool { .. })
        ));
    }

    /// Eight unlabeled rows predicted as class 0 (higher entropy) or class 1,
    /// then labeled rows that make class 0 common and class 1 rare
    fn skewed() -> (crate::data::ArrayDataset, crate::data::PoolPartition) {
        let rows = [
            [0.1f32, 0.0], // class 0, entropy high
            [0.2, 0.0],    // class 0
            [0.3, 0.0],    // class 0
            [0.4, 0.0],    // class 0
            [0.0, 0.5],    // class 1
            [0.0, 1.0],    // class 1
            [0.0, 2.0],    // class 1
            [0.0, 3.0],    // class 1, entropy low
            [0.0, 0.0],    // labeled
            [0.0, 0.0],    // labeled
            [0.0, 0.0],    // labeled
        ];
        let labels = [0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0];
        fixture_with_labels(&rows, &labels, 2, 8)
    }

    #[test]
    fn test_uniform_quotas_split_evenly() {
        let (dataset, pools) = skewed();
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        // Plain uncertainty would take rows 0..4, all class 0
        assert_eq!(Uncertainty.select(&ctx, 4).unwrap(), vec![0, 1, 2, 3]);

        let picks = BalancedUncertainty::new(0.0).select(&ctx, 4).unwrap();
        assert_eq!(picks, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_rare_labeled_class_gets_more_quota() {
        let (dataset, pools) = skewed();
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        // Class 0 has 3 labels, class 1 none: weights 1/4 vs 1 -> quotas 1 and 3
        let picks = BalancedUncertainty::new(1.0).select(&ctx, 4).unwrap();
        assert_eq!(picks, vec![0, 4, 5, 6]);

        let greedy = BalancedUncertainty::greedy(1.0).select(&ctx, 4).unwrap();
        assert_eq!(greedy, vec![0, 4, 5, 6]);
    }

    #[test]
    fn test_shortfall_is_redistributed() {
        let (dataset, pools) = skewed();
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        // Quotas 1 / 6 but class 1 has only 4 candidates
        let exact = BalancedUncertainty::new(1.0).select(&ctx, 7).unwrap();
        assert_eq!(exact.len(), 7);
        assert_eq!(exact, vec![0, 1, 2, 4, 5, 6, 7]);

        let greedy = BalancedUncertainty::greedy(1.0).select(&ctx, 7).unwrap();
        assert_eq!(greedy, vec![0, 1, 2, 4, 5, 6, 7]);
    }

    /// Three classes: class 2 (already well labeled) holds the most uncertain
    /// rows, class 1 the rest, and class 0 is never predicted
    fn three_classes() -> (crate::data::ArrayDataset, crate::data::PoolPartition) {
        let rows = [
            [0.0f32, 0.0, 0.1], // class 2, highest entropy
            [0.0, 0.0, 0.2],
            [0.0, 0.0, 0.3],
            [0.0, 0.0, 0.4],
            [0.0, 0.0, 0.5],
            [0.0, 1.0, 0.0], // class 1
            [0.0, 2.0, 0.0],
            [0.0, 3.0, 0.0],
            [0.0, 4.0, 0.0],
            [0.0, 0.0, 0.0], // labeled
            [0.0, 0.0, 0.0], // labeled
            [0.0, 0.0, 0.0], // labeled
        ];
        let labels = [2, 2, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2];
        fixture_with_labels(&rows, &labels, 3, 9)
    }

    #[test]
    fn test_exact_and_greedy_fill_differ() {
        let (dataset, pools) = three_classes();
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(3);
        let ctx = AcquisitionContext { model: &model, data: &data };

        // Weights 1, 1, 1/4 give quotas 2, 2, 1. Class 0 has no candidates,
        // so two slots are left over.
        assert_eq!(Uncertainty.select(&ctx, 5).unwrap(), vec![0, 1, 2, 3, 4]);

        // Exact: leftovers follow class weight, so class 1 takes both
        let exact = BalancedUncertainty::new(1.0).select(&ctx, 5).unwrap();
        assert_eq!(exact, vec![0, 5, 6, 7, 8]);

        // Greedy: leftovers follow global entropy, so class 2 takes both
        let greedy = BalancedUncertainty::greedy(1.0).select(&ctx, 5).unwrap();
        assert_eq!(greedy, vec![0, 1, 2, 5, 6]);
    }
}

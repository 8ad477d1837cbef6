/// Learning-loss acquisition: label what the loss head expects to get wrong
use super::{check_count, score_unlabeled, top_k, AcquisitionContext, AcquisitionStrategy};
use crate::{ALError, Result};

/// Highest predicted loss first
///
/// Needs a model with a loss-prediction head, trained jointly with the
/// classifier (see `TrainingConfig::learning_loss_factor`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LearningLoss;

impl AcquisitionStrategy for LearningLoss {
    fn name(&self) -> &'static str {
        "learning-loss"
    }

    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>> {
        if !ctx.model.supports_loss_prediction() {
            return Err(ALError::UnsupportedModel("loss prediction"));
        }
        check_count(ctx, count)?;

        let (indices, scores) = score_unlabeled(ctx, |batch| {
            Ok(ctx.model.predict_loss(&batch.inputs)?.to_vec1::<f32>()?)
        })?;
        Ok(top_k(&indices, &scores, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataProvider;
    use crate::testing::{fixture, IdentityModel};
    use candle_core::Device;

    #[test]
    fn test_ranks_by_predicted_loss() {
        let rows = [[0.1f32, 0.0], [2.0, 1.0], [0.5, 0.5], [3.0, 3.0], [9.0, 9.0]];
        let (dataset, pools) = fixture(&rows, 2, 4);
        let data = DataProvider::new(&dataset, &pools, Device::Cpu).with_batch_sizes(8, 3);
        let model = IdentityModel::new(2).with_loss_head();
        let ctx = AcquisitionContext { model: &model, data: &data };

        // Row 4 is labeled; predicted losses 0.1, 3.0, 1.0, 6.0
        assert_eq!(LearningLoss.select(&ctx, 2).unwrap(), vec![3, 1]);
        assert_eq!(LearningLoss.select(&ctx, 4).unwrap(), vec![3, 1, 2, 0]);
        assert!(matches!(
            LearningLoss.select(&ctx, 5),
            Err(ALError::InsufficientPool { requested: 5, available: 4 })
        ));
    }

    #[test]
    fn test_requires_loss_head() {
        let (dataset, pools) = fixture(&[[0.0f32, 1.0]; 4], 2, 2);
        let data = DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        assert!(matches!(
            LearningLoss.select(&ctx, 1),
            Err(ALError::UnsupportedModel(_))
        ));
    }
}

/// Uniform random sampling baseline
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use super::{check_count, AcquisitionContext, AcquisitionStrategy};
use crate::Result;

pub struct RandomSampling {
    rng: StdRng,
}

impl RandomSampling {
    /// Seeded sampler (None = seed from entropy)
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl AcquisitionStrategy for RandomSampling {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&mut self, ctx: &AcquisitionContext<'_, '_>, count: usize) -> Result<Vec<usize>> {
        check_count(ctx, count)?;

        let candidates = ctx.data.pools().unlabeled().to_vec();
        Ok(index::sample(&mut self.rng, candidates.len(), count)
            .into_iter()
            .map(|pos| candidates[pos])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, IdentityModel};
    use crate::ALError;
    use candle_core::Device;
    use std::collections::HashSet;

    #[test]
    fn test_whole_pool() {
        let (dataset, pools) = fixture(&[[0.0, 1.0]; 6], 2, 4);
        let data = crate::data::DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        let mut strategy = RandomSampling::new(Some(0));
        let mut picks = strategy.select(&ctx, 4).unwrap();
        picks.sort_unstable();

        let mut expected = pools.unlabeled().to_vec();
        expected.sort_unstable();
        assert_eq!(picks, expected);
    }

    #[test]
    fn test_subset_without_duplicates() {
        let (dataset, pools) = fixture(&[[0.0, 1.0]; 40], 2, 30);
        let data = crate::data::DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        let picks = RandomSampling::new(Some(1)).select(&ctx, 12).unwrap();
        let unique: HashSet<usize> = picks.iter().copied().collect();
        assert_eq!(unique.len(), 12);
        assert!(picks.iter().all(|&idx| pools.unlabeled().contains(idx)));
    }

    #[test]
    fn test_too_many_requested() {
        let (dataset, pools) = fixture(&[[0.0, 1.0]; 6], 2, 4);
        let data = crate::data::DataProvider::new(&dataset, &pools, Device::Cpu);
        let model = IdentityModel::new(2);
        let ctx = AcquisitionContext { model: &model, data: &data };

        assert!(matches!(
            RandomSampling::new(Some(0)).select(&ctx, 5),
            Err(ALError::InsufficientPool {
                requested: 5,
                available: 4
            })
        ));
    }
}

/// Batch loading over the pools of a run
use candle_core::{Device, Result, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{Batch, BatchDataLoader, Dataset, PoolKind, PoolPartition};

/// Lazy, restartable batch sequence over a fixed list of dataset indices
pub struct PoolLoader<'a> {
    dataset: &'a dyn Dataset,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
    shuffle: Option<StdRng>,
}

impl<'a> PoolLoader<'a> {
    /// Create loader over `indices` (snapshotted)
    pub fn new(dataset: &'a dyn Dataset, indices: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            indices,
            batch_size: batch_size.max(1),
            current_idx: 0,
            shuffle: None,
        }
    }

    /// Shuffle the indices now and on every reset
    pub fn shuffled(mut self, mut rng: StdRng) -> Self {
        self.indices.shuffle(&mut rng);
        self.shuffle = Some(rng);
        self
    }

    /// Indices in current iteration order
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Get next batch
    pub fn next_batch(&mut self, device: &Device) -> Result<Option<Batch>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = self.indices[self.current_idx..end_idx].to_vec();
        let actual_batch_size = batch_indices.len();
        let feature_dim = self.dataset.feature_dim();

        let mut input_data = Vec::with_capacity(actual_batch_size * feature_dim);
        let mut target_data = Vec::with_capacity(actual_batch_size);
        for &idx in &batch_indices {
            input_data.extend(self.dataset.input(idx).iter().copied());
            target_data.push(self.dataset.label(idx));
        }

        self.current_idx = end_idx;

        let inputs = Tensor::from_vec(input_data, (actual_batch_size, feature_dim), device)?;
        let targets = Tensor::from_vec(target_data, actual_batch_size, device)?;

        Ok(Some(Batch {
            indices: batch_indices,
            inputs,
            targets,
        }))
    }

    /// Reset loader for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;

        if let Some(ref mut rng) = self.shuffle {
            self.indices.shuffle(rng);
        }
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        (self.indices.len() + self.batch_size - 1) / self.batch_size
    }
}

impl BatchDataLoader for PoolLoader<'_> {
    fn next_batch(&mut self, device: &Device) -> Result<Option<Batch>> {
        PoolLoader::next_batch(self, device)
    }

    fn reset(&mut self) {
        PoolLoader::reset(self)
    }

    fn num_batches(&self) -> usize {
        PoolLoader::num_batches(self)
    }
}

/// Read-only view of the dataset and pools handed to trainers and strategies
///
/// Borrowing the partition immutably means pools cannot change while a
/// training run or an acquisition pass holds the provider.
pub struct DataProvider<'a> {
    dataset: &'a dyn Dataset,
    pools: &'a PoolPartition,
    device: Device,
    train_batch_size: usize,
    eval_batch_size: usize,
    seed: Option<u64>,
}

impl<'a> DataProvider<'a> {
    /// Create provider with default batch sizes (8 for training, 8192 for evaluation)
    pub fn new(dataset: &'a dyn Dataset, pools: &'a PoolPartition, device: Device) -> Self {
        Self {
            dataset,
            pools,
            device,
            train_batch_size: 8,
            eval_batch_size: 8192,
            seed: None,
        }
    }

    /// Set training and evaluation batch sizes
    pub fn with_batch_sizes(mut self, train: usize, eval: usize) -> Self {
        self.train_batch_size = train.max(1);
        self.eval_batch_size = eval.max(1);
        self
    }

    /// Seed the training shuffle
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn dataset(&self) -> &'a dyn Dataset {
        self.dataset
    }

    pub fn pools(&self) -> &'a PoolPartition {
        self.pools
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn eval_batch_size(&self) -> usize {
        self.eval_batch_size
    }

    /// Ordered loader over any pool
    pub fn loader(&self, kind: PoolKind, batch_size: usize) -> PoolLoader<'a> {
        PoolLoader::new(self.dataset, self.pools.pool(kind).to_vec(), batch_size)
    }

    /// Shuffled batches of the labeled pool
    pub fn train_batches(&self) -> PoolLoader<'a> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.loader(PoolKind::Labeled, self.train_batch_size).shuffled(rng)
    }

    pub fn validation_batches(&self) -> PoolLoader<'a> {
        self.loader(PoolKind::Validation, self.eval_batch_size)
    }

    pub fn test_batches(&self) -> PoolLoader<'a> {
        self.loader(PoolKind::Test, self.eval_batch_size)
    }

    /// Unlabeled pool in pool order, for scoring
    pub fn unlabeled_batches(&self) -> PoolLoader<'a> {
        self.loader(PoolKind::Unlabeled, self.eval_batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ArrayDataset, PoolSizes};
    use ndarray::{Array1, Array2};

    fn toy_dataset(n: usize) -> ArrayDataset {
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f32);
        let labels = Array1::from_shape_fn(n, |i| (i % 3) as u32);
        ArrayDataset::from_arrays(inputs, labels, Some(3)).unwrap()
    }

    #[test]
    fn test_loader_batches_carry_indices() -> Result<()> {
        let dataset = toy_dataset(5);
        let mut loader = PoolLoader::new(&dataset, vec![4, 0, 2], 2);
        assert_eq!(loader.num_batches(), 2);

        let first = loader.next_batch(&Device::Cpu)?.unwrap();
        assert_eq!(first.indices, vec![4, 0]);
        assert_eq!(first.inputs.dims(), &[2, 2]);
        assert_eq!(first.inputs.to_vec2::<f32>()?, vec![vec![40.0, 41.0], vec![0.0, 1.0]]);
        assert_eq!(first.targets.to_vec1::<u32>()?, vec![1, 0]);

        let second = loader.next_batch(&Device::Cpu)?.unwrap();
        assert_eq!(second.indices, vec![2]);
        assert!(loader.next_batch(&Device::Cpu)?.is_none());

        // Restartable
        loader.reset();
        assert_eq!(loader.next_batch(&Device::Cpu)?.unwrap().indices, vec![4, 0]);

        Ok(())
    }

    #[test]
    fn test_shuffled_loader_keeps_members() -> Result<()> {
        let dataset = toy_dataset(20);
        let mut loader =
            PoolLoader::new(&dataset, (0..20).collect(), 6).shuffled(StdRng::seed_from_u64(1));

        let mut seen = Vec::new();
        while let Some(batch) = loader.next_batch(&Device::Cpu)? {
            seen.extend(batch.indices);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());

        Ok(())
    }

    #[test]
    fn test_provider_routes_pools() {
        let dataset = toy_dataset(10);
        let sizes = PoolSizes {
            labeled: 2,
            unlabeled: 4,
            validation: 3,
            test: 1,
        };
        let pools = PoolPartition::split(10, sizes, &mut StdRng::seed_from_u64(0)).unwrap();
        let provider = DataProvider::new(&dataset, &pools, Device::Cpu).with_batch_sizes(1, 3);

        assert_eq!(provider.train_batches().len(), 2);
        assert_eq!(provider.train_batches().num_batches(), 2);
        assert_eq!(provider.unlabeled_batches().indices(), pools.unlabeled().to_vec().as_slice());
        assert_eq!(provider.unlabeled_batches().num_batches(), 2);
        assert_eq!(provider.validation_batches().num_batches(), 1);
        assert_eq!(provider.test_batches().len(), 1);
    }
}

/// Datasets, pools and batch loading
pub mod numpy_dataset;
pub mod pool;
pub mod provider;

pub use numpy_dataset::{ArrayDataset, DatasetMetadata};
pub use pool::{BalanceReport, ClassBalanceSpec, Pool, PoolKind, PoolPartition, PoolSizes};
pub use provider::{DataProvider, PoolLoader};

use candle_core::{Device, Result, Tensor};
use ndarray::ArrayView1;

/// Indexed, immutable source of labeled examples
pub trait Dataset {
    /// Number of examples
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of a single input vector
    fn feature_dim(&self) -> usize;

    /// Number of classes
    fn num_classes(&self) -> usize;

    /// Input features of example `idx`
    fn input(&self, idx: usize) -> ArrayView1<'_, f32>;

    /// Class label of example `idx`
    fn label(&self, idx: usize) -> u32;
}

/// One batch of examples together with the dataset indices it was built from
#[derive(Debug, Clone)]
pub struct Batch {
    /// Dataset indices, in batch row order
    pub indices: Vec<usize>,
    /// Inputs: [batch, feature_dim]
    pub inputs: Tensor,
    /// Targets: [batch] (u32)
    pub targets: Tensor,
}

impl Batch {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Generic data loader trait
pub trait BatchDataLoader {
    /// Get next batch
    fn next_batch(&mut self, device: &Device) -> Result<Option<Batch>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}

//! Test doubles shared by unit tests

use candle_core::{Tensor, Var};
use ndarray::{Array1, Array2};

use crate::data::{ArrayDataset, PoolPartition};
use crate::models::Model;
use crate::{ALError, Result};

/// Model whose class scores are its inputs
///
/// Embeddings are the inputs too (unless disabled); the optional loss head
/// predicts the row sum.
pub struct IdentityModel {
    num_classes: usize,
    loss_head: bool,
    embedding: bool,
    pub resets: usize,
}

impl IdentityModel {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            loss_head: false,
            embedding: true,
            resets: 0,
        }
    }

    pub fn with_loss_head(mut self) -> Self {
        self.loss_head = true;
        self
    }

    pub fn without_embedding(mut self) -> Self {
        self.embedding = false;
        self
    }
}

impl Model for IdentityModel {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(input.clone())
    }

    fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn trainable_vars(&self) -> Vec<Var> {
        Vec::new()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn supports_loss_prediction(&self) -> bool {
        self.loss_head
    }

    fn predict_loss(&self, input: &Tensor) -> Result<Tensor> {
        if !self.loss_head {
            return Err(ALError::UnsupportedModel("loss prediction"));
        }
        Ok(input.sum(1)?)
    }

    fn supports_embedding(&self) -> bool {
        self.embedding
    }

    fn embed(&self, input: &Tensor) -> Result<Tensor> {
        if !self.embedding {
            return Err(ALError::UnsupportedModel("embedding"));
        }
        Ok(input.clone())
    }
}

/// Dataset of `rows` with explicit labels; the first `unlabeled` rows form
/// the unlabeled pool (in order), the rest are labeled
pub fn fixture_with_labels<const K: usize>(
    rows: &[[f32; K]],
    labels: &[u32],
    num_classes: usize,
    unlabeled: usize,
) -> (ArrayDataset, PoolPartition) {
    let n = rows.len();
    let inputs = Array2::from_shape_fn((n, K), |(i, j)| rows[i][j]);
    let dataset =
        ArrayDataset::from_arrays(inputs, Array1::from(labels.to_vec()), Some(num_classes)).unwrap();
    let pools = PoolPartition::from_indices(
        n,
        (unlabeled..n).collect(),
        (0..unlabeled).collect(),
        Vec::new(),
        Vec::new(),
    )
    .unwrap();
    (dataset, pools)
}

/// Like `fixture_with_labels` with labels cycling through the classes
pub fn fixture<const K: usize>(
    rows: &[[f32; K]],
    num_classes: usize,
    unlabeled: usize,
) -> (ArrayDataset, PoolPartition) {
    let labels: Vec<u32> = (0..rows.len()).map(|i| (i % num_classes) as u32).collect();
    fixture_with_labels(rows, &labels, num_classes, unlabeled)
}

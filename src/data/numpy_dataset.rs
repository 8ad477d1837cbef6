/// Array-backed dataset loaded from NumPy .npy files
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::Dataset;

/// Metadata from dataset.json
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub num_classes: usize,
    #[serde(default)]
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
}

/// Dataset held in memory as a feature matrix and a label vector
pub struct ArrayDataset {
    inputs: Array2<f32>, // [N, feature_dim]
    labels: Array1<u32>, // [N]
    metadata: DatasetMetadata,
}

impl ArrayDataset {
    /// Build from in-memory arrays
    ///
    /// `num_classes` is inferred from the largest label when not given.
    pub fn from_arrays(
        inputs: Array2<f32>,
        labels: Array1<u32>,
        num_classes: Option<usize>,
    ) -> crate::Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(crate::ALError::Config(format!(
                "Shape mismatch: {} inputs != {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }

        let inferred = labels.iter().max().map(|&l| l as usize + 1).unwrap_or(0);
        let num_classes = num_classes.unwrap_or(inferred);
        if inferred > num_classes {
            return Err(crate::ALError::Config(format!(
                "Label {} out of range for {} classes",
                inferred - 1,
                num_classes
            )));
        }

        let metadata = DatasetMetadata {
            num_classes,
            num_examples: inputs.nrows(),
            description: String::new(),
        };

        Ok(Self {
            inputs,
            labels,
            metadata,
        })
    }

    /// Load from directory containing inputs.npy, labels.npy and dataset.json
    pub fn from_directory<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading NumPy dataset from: {:?}", dir);

        let metadata_path = dir.join("dataset.json");
        let metadata: Option<DatasetMetadata> = if metadata_path.exists() {
            let file = File::open(&metadata_path)?;
            let reader = BufReader::new(file);
            Some(serde_json::from_reader(reader)?)
        } else {
            log::warn!("dataset.json not found, inferring class count from labels");
            None
        };

        // Python saves float64 features and int64 labels by default
        let inputs_f64 = Array2::<f64>::read_npy(File::open(dir.join("inputs.npy"))?)?;
        let inputs = inputs_f64.mapv(|x| x as f32);
        log::info!("Loaded inputs: shape {:?}", inputs.shape());

        let labels_i64 = Array1::<i64>::read_npy(File::open(dir.join("labels.npy"))?)?;
        if let Some(&bad) = labels_i64.iter().find(|&&l| l < 0 || l > u32::MAX as i64) {
            return Err(crate::ALError::Config(format!("Invalid label {}", bad)));
        }
        let labels = labels_i64.mapv(|x| x as u32);
        log::info!("Loaded labels: shape {:?}", labels.shape());

        let mut dataset = Self::from_arrays(inputs, labels, metadata.as_ref().map(|m| m.num_classes))?;
        if let Some(metadata) = metadata {
            dataset.metadata.description = metadata.description;
        }

        log::info!(
            "Dataset loaded: {} examples, feature_dim={}, num_classes={}",
            dataset.len(),
            dataset.feature_dim(),
            dataset.num_classes()
        );

        Ok(dataset)
    }

    /// Get metadata
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }
}

impl Dataset for ArrayDataset {
    fn len(&self) -> usize {
        self.inputs.nrows()
    }

    fn feature_dim(&self) -> usize {
        self.inputs.ncols()
    }

    fn num_classes(&self) -> usize {
        self.metadata.num_classes
    }

    fn input(&self, idx: usize) -> ArrayView1<'_, f32> {
        self.inputs.row(idx)
    }

    fn label(&self, idx: usize) -> u32 {
        self.labels[idx]
    }
}

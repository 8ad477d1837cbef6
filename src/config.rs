/// Configuration for an active learning run
///
/// Mirrors the knobs of the experiment runner: dataset, acquisition method,
/// labeling schedule, class balance and the per-round training budget.
use std::path::PathBuf;

use crate::strategy::AcquisitionMethod;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ActiveLearningConfig {
    /// Dataset name, used to tag metrics
    pub dataset: String,

    /// Directory holding `inputs.npy`, `labels.npy` and `dataset.json`
    pub data_dir: PathBuf,

    /// Unlabeled data acquisition method
    pub acquisition_method: AcquisitionMethod,

    /// Fraction of the dataset held out for testing
    pub test_split: f32,

    /// Fraction of the remaining data used for training, the rest is validation
    pub train_split: f32,

    /// Learning rate for AdamW
    pub learning_rate: f64,

    /// Batch size used for training the model
    pub train_batch_size: usize,

    /// Batch size used for evaluating and scoring
    pub eval_batch_size: usize,

    /// Minimum epochs before early stopping may end a round
    pub min_epochs: usize,

    /// Hard cap on epochs per round (None = until early stopping fires)
    pub max_epochs: Option<usize>,

    /// Epochs without validation improvement before a round ends
    pub early_stopping_patience: usize,

    /// Class balance multiplier applied to half of the classes
    pub class_balance: f32,

    /// Exponent adjusting how strongly balanced strategies favour rare classes
    pub class_balance_factor: f32,

    /// Number of initially labeled examples
    pub initial_labels: usize,

    /// Examples labeled per acquisition step
    pub labeling_budget: usize,

    /// Total number of rounds (the last one trains but does not label)
    pub labeling_steps: usize,

    /// Weight of the loss-prediction objective relative to classification
    pub learning_loss_factor: f64,

    /// Hidden width of the loss-prediction head
    pub learning_loss_layer_size: usize,

    /// Hidden layer widths of the classifier
    pub hidden_sizes: Vec<usize>,

    /// Seed for splitting, balancing and sampling (None = from entropy)
    pub seed: Option<u64>,

    /// Optional JSON-lines metrics file
    pub metrics_path: Option<PathBuf>,
}

impl Default for ActiveLearningConfig {
    fn default() -> Self {
        Self {
            dataset: "mnist".to_string(),
            data_dir: PathBuf::from("./datasets"),
            acquisition_method: AcquisitionMethod::Uncertainty,
            test_split: 0.2,
            train_split: 0.8,
            learning_rate: 2e-4,
            train_batch_size: 8,
            eval_batch_size: 8192,
            min_epochs: 25,
            max_epochs: None,
            early_stopping_patience: 10,
            class_balance: 0.5,
            class_balance_factor: 1.0,
            initial_labels: 100,
            labeling_budget: 50,
            labeling_steps: 10,
            learning_loss_factor: 0.1,
            learning_loss_layer_size: 16,
            hidden_sizes: vec![128, 64],
            seed: None,
            metrics_path: None,
        }
    }
}

impl ActiveLearningConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        for (name, value) in [("test_split", self.test_split), ("train_split", self.train_split)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::ALError::Config(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.train_batch_size == 0 || self.eval_batch_size == 0 {
            return Err(crate::ALError::Config(
                "batch sizes must be > 0".to_string(),
            ));
        }

        if self.initial_labels == 0 {
            return Err(crate::ALError::Config(
                "initial_labels must be > 0".to_string(),
            ));
        }

        if self.labeling_steps == 0 {
            return Err(crate::ALError::Config(
                "labeling_steps must be > 0".to_string(),
            ));
        }

        if self.early_stopping_patience == 0 {
            return Err(crate::ALError::Config(
                "early_stopping_patience must be > 0".to_string(),
            ));
        }

        if let Some(max_epochs) = self.max_epochs {
            if max_epochs < self.min_epochs.max(1) {
                return Err(crate::ALError::Config(format!(
                    "max_epochs ({}) must be >= min_epochs ({}) and > 0",
                    max_epochs, self.min_epochs
                )));
            }
        }

        if !self.class_balance.is_finite() || self.class_balance < 0.0 {
            return Err(crate::ALError::Config(format!(
                "class_balance must be a nonnegative number, got {}",
                self.class_balance
            )));
        }

        if !self.class_balance_factor.is_finite() {
            return Err(crate::ALError::Config(
                "class_balance_factor must be finite".to_string(),
            ));
        }

        if self.hidden_sizes.iter().any(|&h| h == 0) {
            return Err(crate::ALError::Config(
                "hidden layer sizes must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Total labels requested over the whole run
    pub fn total_labels(&self) -> usize {
        self.initial_labels + self.labeling_budget * self.labeling_steps.saturating_sub(1)
    }

    /// Name used to tag metrics of this run
    pub fn run_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.dataset, self.acquisition_method, self.class_balance_factor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ActiveLearningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_split() {
        let config = ActiveLearningConfig {
            train_split: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(crate::ALError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_steps() {
        let config = ActiveLearningConfig {
            labeling_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_initial_labels() {
        let config = ActiveLearningConfig {
            initial_labels: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(crate::ALError::Config(_))));
    }

    #[test]
    fn test_total_labels() {
        let config = ActiveLearningConfig {
            initial_labels: 100,
            labeling_budget: 50,
            labeling_steps: 3,
            ..Default::default()
        };
        assert_eq!(config.total_labels(), 200);
    }

    #[test]
    fn test_run_name() {
        let config = ActiveLearningConfig {
            dataset: "cifar10".to_string(),
            acquisition_method: AcquisitionMethod::CoreSetGreedy,
            class_balance_factor: 1.0,
            ..Default::default()
        };
        assert_eq!(config.run_name(), "cifar10_core-set-greedy_1");
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "dataset": "svhn",
            "acquisition_method": "uncertainty-balanced",
            "labeling_steps": 4,
            "seed": 7
        }"#;

        let config: ActiveLearningConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.acquisition_method, AcquisitionMethod::UncertaintyBalanced);
        assert_eq!(config.labeling_steps, 4);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.initial_labels, 100);
    }
}

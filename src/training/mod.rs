/// Training infrastructure for the active learning loop
pub mod early_stopping;
pub mod metrics;
pub mod trainer;

pub use early_stopping::{EarlyStopping, StoppingAction};
pub use metrics::{EvalMetrics, FitSummary, JsonLinesSink, LogSink, MetricsSink, MultiSink, RoundMetrics};
pub use trainer::{ClassifierTrainer, Trainer, TrainingConfig};

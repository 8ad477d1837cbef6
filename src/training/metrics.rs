/// Evaluation results and per-round metrics output
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Loss and accuracy over validation and test pools
///
/// A field is None when its pool is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub validation_loss: Option<f32>,
    pub validation_accuracy: Option<f32>,
    pub test_loss: Option<f32>,
    pub test_accuracy: Option<f32>,
}

/// Outcome of one `Trainer::fit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FitSummary {
    /// Epochs run
    pub epochs: usize,
    /// Mean training loss of the last epoch
    pub train_loss: f32,
    /// Best monitored score of this fit
    pub best_score: Option<f32>,
    /// Whether early stopping ended the fit
    pub stopped_early: bool,
}

/// Scalars emitted once per evaluation point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundMetrics {
    pub run: String,
    pub round: usize,
    pub labeled: usize,
    pub epochs: usize,
    pub train_loss: f32,
    pub validation_loss: Option<f32>,
    pub validation_accuracy: Option<f32>,
    pub test_loss: Option<f32>,
    pub test_accuracy: Option<f32>,
}

/// Destination for round metrics
pub trait MetricsSink {
    fn record(&mut self, metrics: &RoundMetrics) -> crate::Result<()>;
}

/// Writes metrics through the `log` facade
#[derive(Debug, Default)]
pub struct LogSink;

fn fmt_opt(value: Option<f32>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

impl MetricsSink for LogSink {
    fn record(&mut self, m: &RoundMetrics) -> crate::Result<()> {
        log::info!(
            "[{}] round {}: labeled={}, epochs={}, train_loss={:.4}, val_loss={}, val_acc={}, test_loss={}, test_acc={}",
            m.run,
            m.round,
            m.labeled,
            m.epochs,
            m.train_loss,
            fmt_opt(m.validation_loss),
            fmt_opt(m.validation_accuracy),
            fmt_opt(m.test_loss),
            fmt_opt(m.test_accuracy),
        );
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Create (or truncate) the metrics file
    pub fn create<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path.as_ref())?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl MetricsSink for JsonLinesSink {
    fn record(&mut self, metrics: &RoundMetrics) -> crate::Result<()> {
        serde_json::to_writer(&mut self.writer, metrics)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Fans metrics out to several sinks
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for MultiSink {
    fn record(&mut self, metrics: &RoundMetrics) -> crate::Result<()> {
        for sink in &mut self.sinks {
            sink.record(metrics)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RoundMetrics {
        RoundMetrics {
            run: "mnist_random_1".to_string(),
            round: 2,
            labeled: 150,
            epochs: 30,
            train_loss: 0.25,
            validation_loss: Some(0.3),
            validation_accuracy: Some(0.9),
            test_loss: None,
            test_accuracy: None,
        }
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("metrics.jsonl");

        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.record(&sample()).unwrap();
        sink.record(&sample()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["labeled"], 150);
        assert_eq!(parsed["run"], "mnist_random_1");
        assert!(parsed["test_loss"].is_null());
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");

        let mut sink = MultiSink::new()
            .with(Box::new(LogSink))
            .with(Box::new(JsonLinesSink::create(&first).unwrap()))
            .with(Box::new(JsonLinesSink::create(&second).unwrap()));
        sink.record(&sample()).unwrap();

        for path in [first, second] {
            let contents = std::fs::read_to_string(&path).unwrap();
            assert_eq!(contents.lines().count(), 1);
        }
    }
}

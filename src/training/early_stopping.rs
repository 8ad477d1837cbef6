//! Early stopping on a minimised score, resettable between rounds

/// Decision after observing an epoch's score
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoppingAction {
    /// Keep training
    Continue,
    /// Patience exhausted
    Stop,
}

/// Early stopping criterion
///
/// Tracks the best (lowest) score and how many epochs have passed without
/// improving on it by more than `min_delta`. Each active learning round must
/// start from a clean slate: `reset` puts the best score back to a sentinel
/// that every finite score beats.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    /// Number of epochs to wait for improvement
    patience: usize,
    /// Minimum improvement to reset patience
    min_delta: f32,
    /// Best score seen since the last reset
    best_score: f32,
    /// Epochs without improvement
    pub(crate) epochs_without_improvement: usize,
    /// Epochs observed since the last reset
    epochs_seen: usize,
}

impl EarlyStopping {
    /// Create new early stopping criterion
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best_score: f32::INFINITY,
            epochs_without_improvement: 0,
            epochs_seen: 0,
        }
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.best_score = f32::INFINITY;
        self.epochs_without_improvement = 0;
        self.epochs_seen = 0;
    }

    /// Best score since the last reset (None before the first improvement)
    pub fn best_score(&self) -> Option<f32> {
        if self.best_score.is_finite() {
            Some(self.best_score)
        } else {
            None
        }
    }

    pub fn epochs_seen(&self) -> usize {
        self.epochs_seen
    }

    /// Check if score improved
    fn check_improvement(&mut self, score: f32) -> bool {
        // The sentinel is beaten by any finite score, even with min_delta
        let threshold = if self.best_score.is_finite() {
            self.best_score - self.min_delta
        } else {
            f32::INFINITY
        };

        if score < threshold {
            self.best_score = score;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }

    /// Record an epoch's score
    pub fn observe(&mut self, score: f32) -> StoppingAction {
        self.epochs_seen += 1;
        self.check_improvement(score);

        if self.epochs_without_improvement >= self.patience {
            log::debug!(
                "Early stopping: no improvement for {} epochs (best score: {:.4})",
                self.patience,
                self.best_score
            );
            StoppingAction::Stop
        } else {
            StoppingAction::Continue
        }
    }
}

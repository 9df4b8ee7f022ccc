mod batch;
mod selection;

pub use batch::{run_batch, BatchFailure, BatchSummary, PredictionFiles, PredictionWriter};
pub use selection::BatchSelection;

/// Trait for batch progress destinations (a progress bar, a log, a test recorder)
pub trait ProgressSink {
    /// Called once after every processed item, failed or not
    fn report(&mut self, done: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, usize),
{
    fn report(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Progress sink that writes percentages to the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, done: usize, total: usize) {
        let percent = if total == 0 {
            100.0
        } else {
            done as f64 * 100.0 / total as f64
        };
        tracing::info!("Progress {}/{} ({:.0}%)", done, total, percent);
    }
}

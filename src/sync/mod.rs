use indicatif::ProgressBar;

pub mod fetcher;

/// Receives whole percentages (0..=100) while a playlist is being fetched.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

impl ProgressObserver for ProgressBar {
    fn on_progress(&self, percent: u8) {
        self.set_position(u64::from(percent));
    }
}

/// `round(batch_index / total_batches * 100)`, with an empty fetch counting as done.
pub fn progress_percent(batch_index: usize, total_batches: usize) -> u8 {
    if total_batches == 0 {
        return 100;
    }
    let batch_index = batch_index.min(total_batches);
    ((batch_index * 100 + total_batches / 2) / total_batches) as u8
}

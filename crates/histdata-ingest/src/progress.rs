//! Import progress reporting
//!
//! Progress is counted in quarter-record ticks: a record advances one tick
//! when it is dispatched to a worker and three more when its worker is done,
//! whatever the outcome.

use indicatif::{ProgressBar, ProgressStyle};

/// Ticks one record is worth
pub const TICKS_PER_RECORD: u64 = 4;

/// Ticks added when a record is handed to a worker
pub const DISPATCH_TICKS: u64 = 1;

/// Ticks added when a worker finishes a record
pub const COMPLETION_TICKS: u64 = TICKS_PER_RECORD - DISPATCH_TICKS;

/// Observer of pipeline progress; every method defaults to a no-op
pub trait ProgressReporter: Send + Sync {
    fn start(&self, _records: usize) {}
    fn record_dispatched(&self, _url: &str) {}
    fn record_completed(&self, _url: &str) {}
    fn finish(&self) {}
}

/// Reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Terminal progress bar
#[derive(Debug, Clone)]
pub struct ImportProgress {
    bar: ProgressBar,
}

impl ImportProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Progress that is tracked but never drawn
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}% ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message("Importing records");
        Self { bar }
    }

    /// Completed records, counting partial ones as fractions
    pub fn records_done(&self) -> f64 {
        self.bar.position() as f64 / TICKS_PER_RECORD as f64
    }
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ImportProgress {
    fn start(&self, records: usize) {
        self.bar.set_length(records as u64 * TICKS_PER_RECORD);
        self.bar.set_position(0);
    }

    fn record_dispatched(&self, _url: &str) {
        self.bar.inc(DISPATCH_TICKS);
    }

    fn record_completed(&self, _url: &str) {
        self.bar.inc(COMPLETION_TICKS);
    }

    fn finish(&self) {
        self.bar
            .finish_with_message(format!("Import finished ({:.0} records)", self.records_done()));
    }
}

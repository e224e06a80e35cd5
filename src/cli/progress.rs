//! Terminal progress display for the CLI

use crate::{
    services::{ProcessingStage, ProgressReporter, ProgressUpdate},
    types::StageTimings,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar driven by pipeline stage percentages
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
}

impl IndicatifProgressReporter {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        if update.attempt > 1 {
            self.bar
                .set_message(format!("{} (attempt {})", update.description, update.attempt));
        } else {
            self.bar.set_message(update.description);
        }
    }

    fn report_completion(&self, timings: &StageTimings) {
        self.bar
            .finish_with_message(format!("done in {}ms", timings.total_ms));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("❌ {} failed: {}", stage.description(), error));
    }

    fn report_retry(&self, next_attempt: u32, delay_ms: u64) {
        self.bar.set_position(0);
        self.bar
            .set_message(format!("retrying (attempt {}) in {}ms", next_attempt, delay_ms));
    }
}

impl Drop for IndicatifProgressReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

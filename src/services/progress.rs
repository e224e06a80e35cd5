//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.
//! Progress carries no control-flow meaning.

use crate::types::StageTimings;
use instant::Instant;
use std::sync::Arc;

/// Stages of one pipeline attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Finding people in the image
    Detecting,
    /// Ranking people and choosing who to remove
    Separating,
    /// Building the fill-region mask
    MaskGenerating,
    /// Running generative fill
    Inpainting,
    /// Sanity-checking the inpainted result
    Validating,
    /// Result assembled
    Completed,
}

/// Percent and message shown to a polling UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    pub percent: u8,
    pub message: &'static str,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Detecting => "Detecting people in the image",
            ProcessingStage::Separating => "Identifying main subjects",
            ProcessingStage::MaskGenerating => "Preparing removal mask",
            ProcessingStage::Inpainting => "Removing background people",
            ProcessingStage::Validating => "Checking the result",
            ProcessingStage::Completed => "Person removal completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Detecting => 25,
            ProcessingStage::Separating => 50,
            ProcessingStage::MaskGenerating => 60,
            ProcessingStage::Inpainting => 75,
            ProcessingStage::Validating => 95,
            ProcessingStage::Completed => 100,
        }
    }

    /// Stable lower-case stage name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Detecting => "detecting",
            ProcessingStage::Separating => "separating",
            ProcessingStage::MaskGenerating => "mask_generating",
            ProcessingStage::Inpainting => "inpainting",
            ProcessingStage::Validating => "validating",
            ProcessingStage::Completed => "completed",
        }
    }

    /// Parse a stage name as produced by [`name`](Self::name)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "detecting" => Some(ProcessingStage::Detecting),
            "separating" => Some(ProcessingStage::Separating),
            "mask_generating" => Some(ProcessingStage::MaskGenerating),
            "inpainting" => Some(ProcessingStage::Inpainting),
            "validating" => Some(ProcessingStage::Validating),
            "completed" => Some(ProcessingStage::Completed),
            _ => None,
        }
    }
}

/// Progress lookup by stage name for UI polling
#[must_use]
pub fn progress_for(stage_name: &str) -> Option<StageProgress> {
    ProcessingStage::from_name(stage_name).map(|stage| StageProgress {
        percent: stage.progress_percentage(),
        message: stage.description(),
    })
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Pipeline attempt this update belongs to (1-based)
    pub attempt: u32,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, attempt: u32, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            attempt,
            stage,
        }
    }
}

/// Trait for reporting progress during person removal
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report a successful run with final timings
    fn report_completion(&self, timings: &StageTimings);

    /// Report a failed attempt
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report that another attempt will start after `delay_ms`
    fn report_retry(&self, next_attempt: u32, delay_ms: u64) {
        let _ = (next_attempt, delay_ms);
    }
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &StageTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} (attempt {}, {}ms elapsed)",
                update.progress,
                update.description,
                update.attempt,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &StageTimings) {
        log::info!("✅ Person removal completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Detection: {}ms", timings.detection_ms);
            log::info!("    • Separation: {}ms", timings.separation_ms);
            log::info!("    • Mask generation: {}ms", timings.mask_generation_ms);
            log::info!("    • Inpainting: {}ms", timings.inpainting_ms);
            log::info!("    • Validation: {}ms", timings.validation_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }

    fn report_retry(&self, next_attempt: u32, delay_ms: u64) {
        log::warn!("🔁 Retrying (attempt {}) in {}ms", next_attempt, delay_ms);
    }
}

/// Progress tracker that manages timing and progress reporting for one run
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    attempt: u32,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            attempt: 1,
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    /// Start tracking a new attempt
    pub fn begin_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
        self.current_stage = None;
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.attempt, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &StageTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error in the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Detecting);
        self.reporter.report_error(stage, error);
    }

    pub fn report_retry(&self, next_attempt: u32, delay_ms: u64) {
        self.reporter.report_retry(next_attempt, delay_ms);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test progress reporter that captures reports for verification
    #[derive(Default)]
    struct TestProgressReporter {
        progress_updates: Mutex<Vec<ProgressUpdate>>,
        completions: Mutex<Vec<StageTimings>>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
        retries: Mutex<Vec<(u32, u64)>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.progress_updates.lock().unwrap().push(update);
        }

        fn report_completion(&self, timings: &StageTimings) {
            self.completions.lock().unwrap().push(timings.clone());
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }

        fn report_retry(&self, next_attempt: u32, delay_ms: u64) {
            self.retries.lock().unwrap().push((next_attempt, delay_ms));
        }
    }

    #[test]
    fn test_progress_for_named_stages() {
        let cases = [
            ("detecting", 25),
            ("separating", 50),
            ("inpainting", 75),
            ("completed", 100),
        ];
        for (name, percent) in cases {
            let progress = progress_for(name).unwrap();
            assert_eq!(progress.percent, percent, "{}", name);
            assert!(!progress.message.is_empty());
        }
        assert_eq!(progress_for("Detecting").unwrap().percent, 25);
        assert!(progress_for("uploading").is_none());
    }

    #[test]
    fn test_stage_names_round_trip() {
        for stage in [
            ProcessingStage::Detecting,
            ProcessingStage::Separating,
            ProcessingStage::MaskGenerating,
            ProcessingStage::Inpainting,
            ProcessingStage::Validating,
            ProcessingStage::Completed,
        ] {
            assert_eq!(ProcessingStage::from_name(stage.name()), Some(stage));
        }
    }

    #[test]
    fn test_no_op_progress_reporter() {
        let reporter = NoOpProgressReporter;
        reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Inpainting,
            1,
            Instant::now(),
        ));
        reporter.report_completion(&StageTimings::default());
        reporter.report_error(ProcessingStage::Inpainting, "test error");
        reporter.report_retry(2, 1000);
    }

    #[test]
    fn test_progress_tracker() {
        let reporter = Arc::new(TestProgressReporter::default());
        let mut tracker = ProgressTracker::new(reporter.clone());

        tracker.report_stage(ProcessingStage::Detecting);
        tracker.report_error("segmenter down");
        tracker.report_retry(2, 1000);
        tracker.begin_attempt(2);
        assert!(tracker.current_stage().is_none());
        tracker.report_stage(ProcessingStage::Detecting);
        tracker.report_stage(ProcessingStage::Separating);
        tracker.report_completion(&StageTimings::default());

        let updates = reporter.progress_updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].attempt, 1);
        assert_eq!(updates[2].attempt, 2);
        assert_eq!(updates[2].progress, 50);

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(
            errors.as_slice(),
            &[(ProcessingStage::Detecting, "segmenter down".to_string())]
        );
        assert_eq!(reporter.retries.lock().unwrap().as_slice(), &[(2, 1000)]);
        assert_eq!(reporter.completions.lock().unwrap().len(), 1);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Separating));
    }
}

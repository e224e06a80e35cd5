//! Person removal pipeline orchestrator
//!
//! This module provides the `PersonRemovalProcessor` that sequences detection,
//! separation, mask generation, inpainting and validation, and wraps the whole
//! sequence in a bounded retry loop with exponential backoff. Both the CLI and
//! library callers go through it, so they share one behaviour.
//!
//! Failures never escape [`PersonRemovalProcessor::run`]: every outcome is
//! reported as a [`PersonRemovalResult`].

use crate::{
    config::PersonRemovalOptions,
    detection::{detect_with_fallback, DetectionStrategy, FallbackDetection, PrimaryDetection},
    error::{PersonRemovalError, Result},
    inference::{InpainterRegistry, MaskRefiner, PersonDetector, Segmenter},
    inpainting::{build_prompt, InpaintingSelector},
    mask::MaskGenerator,
    separation::separate,
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    types::{PersonRemovalResult, RemovalDetails, StageTimings},
    utils::validation::{ResultValidator, UrlResultValidator},
};
use instant::Instant;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, span, warn, Instrument, Level};

/// Inpainting model reported when nothing had to be removed
pub const NO_INPAINTING_MODEL: &str = "none";

/// States of one pipeline attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Detecting,
    Separating,
    /// Nobody had to be removed; the original image is the result
    NoRemovalNeeded,
    MaskGenerating,
    Inpainting,
    Validating,
    Completed,
    Failed,
}

impl PipelineState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Detecting => "detecting",
            PipelineState::Separating => "separating",
            PipelineState::NoRemovalNeeded => "no_removal_needed",
            PipelineState::MaskGenerating => "mask_generating",
            PipelineState::Inpainting => "inpainting",
            PipelineState::Validating => "validating",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        }
    }

    /// Whether the attempt ends in this state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::NoRemovalNeeded | PipelineState::Completed | PipelineState::Failed
        )
    }

    fn progress_stage(self) -> Option<ProcessingStage> {
        match self {
            PipelineState::Detecting => Some(ProcessingStage::Detecting),
            PipelineState::Separating => Some(ProcessingStage::Separating),
            PipelineState::MaskGenerating => Some(ProcessingStage::MaskGenerating),
            PipelineState::Inpainting => Some(ProcessingStage::Inpainting),
            PipelineState::Validating => Some(ProcessingStage::Validating),
            PipelineState::NoRemovalNeeded | PipelineState::Completed => {
                Some(ProcessingStage::Completed)
            },
            PipelineState::Failed => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pipeline attempt
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Terminal state: `Completed`, `NoRemovalNeeded` or `Failed`
    pub state: PipelineState,
    /// Stage that was running when the attempt failed
    pub failed_stage: Option<PipelineState>,
    pub details: RemovalDetails,
    pub timings: StageTimings,
    /// Result URL on success
    pub result: Result<String>,
}

impl PipelineOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Factory trait for wiring the remote capabilities of a pipeline
pub trait ServiceFactory: Send + Sync {
    /// Build the capability clients
    ///
    /// # Errors
    ///
    /// Returns `PersonRemovalError` for:
    /// - Invalid endpoint configuration
    /// - Client construction failures
    fn create_services(&self) -> Result<PipelineServices>;

    /// Short human-readable description for logs
    fn description(&self) -> String;
}

#[derive(Clone)]
struct FallbackServices {
    detector: Arc<dyn PersonDetector>,
    refiner: Arc<dyn MaskRefiner>,
}

/// Injected capability handles used by the pipeline
#[derive(Clone)]
pub struct PipelineServices {
    segmenter: Arc<dyn Segmenter>,
    fallback: Option<FallbackServices>,
    inpainters: InpainterRegistry,
    validator: Arc<dyn ResultValidator>,
}

impl PipelineServices {
    /// Start building services around the primary segmenter
    #[must_use]
    pub fn builder(segmenter: Arc<dyn Segmenter>) -> PipelineServicesBuilder {
        PipelineServicesBuilder {
            segmenter,
            fallback: None,
            inpainters: InpainterRegistry::new(),
            validator: Arc::new(UrlResultValidator::new()),
        }
    }

    /// Whether a box detector and refiner are available
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    #[must_use]
    pub fn inpainters(&self) -> &InpainterRegistry {
        &self.inpainters
    }
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices")
            .field("segmenter", &self.segmenter.name())
            .field("fallback", &self.has_fallback())
            .field("inpainters", &self.inpainters)
            .finish()
    }
}

/// Builder for `PipelineServices`
pub struct PipelineServicesBuilder {
    segmenter: Arc<dyn Segmenter>,
    fallback: Option<FallbackServices>,
    inpainters: InpainterRegistry,
    validator: Arc<dyn ResultValidator>,
}

impl PipelineServicesBuilder {
    /// Box detector and refiner for the fallback detection chain
    #[must_use]
    pub fn fallback(
        mut self,
        detector: Arc<dyn PersonDetector>,
        refiner: Arc<dyn MaskRefiner>,
    ) -> Self {
        self.fallback = Some(FallbackServices { detector, refiner });
        self
    }

    /// Register one inpainting back-end at the end of the priority list
    #[must_use]
    pub fn inpainter(mut self, inpainter: Arc<dyn crate::inference::Inpainter>) -> Self {
        self.inpainters.register(inpainter);
        self
    }

    /// Replace the inpainting registry
    #[must_use]
    pub fn inpainters(mut self, registry: InpainterRegistry) -> Self {
        self.inpainters = registry;
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn ResultValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// # Errors
    /// - No inpainting back-end registered
    pub fn build(self) -> Result<PipelineServices> {
        if self.inpainters.is_empty() {
            return Err(PersonRemovalError::invalid_config(
                "At least one inpainting back-end must be registered",
            ));
        }

        Ok(PipelineServices {
            segmenter: self.segmenter,
            fallback: self.fallback,
            inpainters: self.inpainters,
            validator: self.validator,
        })
    }
}

/// Per-attempt bookkeeping
struct AttemptState {
    stage: PipelineState,
    details: RemovalDetails,
    timings: StageTimings,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            stage: PipelineState::Detecting,
            details: RemovalDetails::default(),
            timings: StageTimings::default(),
        }
    }

    fn enter(&mut self, stage: PipelineState, tracker: &mut ProgressTracker) {
        debug!(from = %self.stage, to = %stage, "Pipeline state transition");
        self.stage = stage;
        if let Some(progress) = stage.progress_stage() {
            tracker.report_stage(progress);
        }
    }
}

/// Orchestrates person removal for one configuration
pub struct PersonRemovalProcessor {
    options: PersonRemovalOptions,
    primary: PrimaryDetection,
    fallback: Option<FallbackDetection>,
    mask_generator: MaskGenerator,
    selector: InpaintingSelector,
    validator: Arc<dyn ResultValidator>,
    reporter: Arc<dyn ProgressReporter>,
}

impl PersonRemovalProcessor {
    /// Create a processor from injected services
    ///
    /// # Errors
    ///
    /// Returns `PersonRemovalError` for:
    /// - Invalid options
    pub fn new(services: PipelineServices, options: PersonRemovalOptions) -> Result<Self> {
        options.validate()?;
        let call_timeout = options.timeouts.remote_call();

        let primary =
            PrimaryDetection::new(services.segmenter, options.segmentation.clone(), call_timeout);

        let fallback = match (options.fallback_to_yolo, services.fallback) {
            (true, Some(chain)) => Some(
                FallbackDetection::new(
                    chain.detector,
                    chain.refiner,
                    options.person_detector.clone(),
                    call_timeout,
                )
                .with_parallel_refinement(options.parallel_refinement),
            ),
            (true, None) => {
                warn!("Fallback detection requested but no box detector is configured");
                None
            },
            (false, _) => None,
        };

        if let Some(preferred) = &options.preferred_inpainting_model {
            if services.inpainters.get(preferred).is_none() {
                warn!(
                    model = %preferred,
                    available = ?services.inpainters.names(),
                    "Preferred inpainting model is not registered and will be ignored"
                );
            }
        }

        let selector = InpaintingSelector::new(services.inpainters, call_timeout)
            .with_dedupe_preferred(options.dedupe_preferred_model);

        Ok(Self {
            primary,
            fallback,
            mask_generator: MaskGenerator::new(options.mask_dilation_px),
            selector,
            validator: services.validator,
            reporter: Arc::new(NoOpProgressReporter),
            options,
        })
    }

    /// Create a processor whose services come from `factory`
    ///
    /// # Errors
    ///
    /// Returns `PersonRemovalError` for:
    /// - Service construction failures
    /// - Invalid options
    pub fn with_factory(
        factory: &dyn ServiceFactory,
        options: PersonRemovalOptions,
    ) -> Result<Self> {
        debug!(services = %factory.description(), "Creating pipeline services");
        Self::new(factory.create_services()?, options)
    }

    /// Receive progress notifications on every stage transition
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn options(&self) -> &PersonRemovalOptions {
        &self.options
    }

    /// Remove background people from the image at `image_url`
    pub async fn run(&self, image_url: &str) -> PersonRemovalResult {
        self.run_with_cancellation(image_url, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), aborting as soon as `cancel` fires
    ///
    /// Cancellation interrupts in-flight remote calls and the backoff sleep
    /// and is never retried.
    #[instrument(
        skip(self, cancel),
        fields(
            max_attempts = self.options.retry.max_attempts,
            target_foreground = self.options.target_foreground_count
        )
    )]
    pub async fn run_with_cancellation(
        &self,
        image_url: &str,
        cancel: CancellationToken,
    ) -> PersonRemovalResult {
        let started = Instant::now();

        if image_url.trim().is_empty() {
            let error = PersonRemovalError::invalid_config("Image URL must not be empty");
            return PersonRemovalResult::failed(
                &error,
                RemovalDetails::default(),
                0,
                StageTimings::default(),
            );
        }

        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        let max_attempts = self.options.retry.max_attempts;
        let mut attempt = 1;

        info!("🎯 Starting person removal");

        loop {
            tracker.begin_attempt(attempt);
            let outcome = self
                .run_attempt(image_url, &mut tracker, &cancel)
                .instrument(info_span!("attempt", attempt))
                .await;

            let mut timings = outcome.timings;
            timings.total_ms = started.elapsed().as_millis() as u64;

            let error = match outcome.result {
                Ok(result_url) => {
                    info!(
                        attempt,
                        state = %outcome.state,
                        model = %outcome.details.inpainting_model,
                        total_ms = timings.total_ms,
                        "✅ Person removal completed"
                    );
                    tracker.report_completion(&timings);
                    return PersonRemovalResult::succeeded(
                        result_url,
                        outcome.details,
                        attempt,
                        timings,
                    );
                },
                Err(error) => error,
            };

            tracker.report_error(&error.to_string());

            if let Some(reason) = self.stop_reason(&error, attempt, max_attempts) {
                warn!(attempt, error = %error, reason, "❌ Person removal failed");
                return PersonRemovalResult::failed(&error, outcome.details, attempt, timings);
            }

            let delay = self.options.retry.delay_before_attempt(attempt + 1);
            warn!(
                attempt,
                error = %error,
                failed_stage = ?outcome.failed_stage,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            tracker.report_retry(attempt + 1, delay.as_millis() as u64);

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let cancelled =
                        PersonRemovalError::cancelled("Cancelled while waiting to retry");
                    timings.total_ms = started.elapsed().as_millis() as u64;
                    return PersonRemovalResult::failed(
                        &cancelled,
                        outcome.details,
                        attempt,
                        timings,
                    );
                },
                () = tokio::time::sleep(delay) => {},
            }

            attempt += 1;
        }
    }

    fn stop_reason(
        &self,
        error: &PersonRemovalError,
        attempt: u32,
        max_attempts: u32,
    ) -> Option<&'static str> {
        if !error.is_retryable() {
            Some("not retryable")
        } else if self.options.retry.short_circuit_no_people
            && matches!(error, PersonRemovalError::NoPeopleDetected(_))
        {
            Some("no people in the image")
        } else if attempt >= max_attempts {
            Some("retry budget exhausted")
        } else {
            None
        }
    }

    /// Run every stage once, starting from detection
    pub async fn run_attempt(
        &self,
        image_url: &str,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let mut state = AttemptState::new();
        let result = self.execute(image_url, &mut state, tracker, cancel).await;

        match result {
            Ok(result_url) => {
                let terminal = if state.stage == PipelineState::NoRemovalNeeded {
                    PipelineState::NoRemovalNeeded
                } else {
                    state.enter(PipelineState::Completed, tracker);
                    PipelineState::Completed
                };
                PipelineOutcome {
                    state: terminal,
                    failed_stage: None,
                    details: state.details,
                    timings: state.timings,
                    result: Ok(result_url),
                }
            },
            Err(error) => {
                debug!(stage = %state.stage, error = %error, "Attempt failed");
                PipelineOutcome {
                    state: PipelineState::Failed,
                    failed_stage: Some(state.stage),
                    details: state.details,
                    timings: state.timings,
                    result: Err(error),
                }
            },
        }
    }

    async fn execute(
        &self,
        image_url: &str,
        state: &mut AttemptState,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<String> {
        // Detecting
        state.enter(PipelineState::Detecting, tracker);
        let stage_start = Instant::now();
        let fallback = self.fallback.as_ref().map(|f| f as &dyn DetectionStrategy);
        let detection = guarded(
            cancel,
            detect_with_fallback(&self.primary, fallback, image_url)
                .instrument(span!(Level::INFO, "detection", fallback = fallback.is_some())),
        )
        .await?;
        state.timings.detection_ms = stage_start.elapsed().as_millis() as u64;
        state.details.people_detected = detection.len();
        state.details.model_used = detection.source.as_str().to_string();

        if detection.is_empty() {
            return Err(PersonRemovalError::no_people(format!(
                "no confident person detections ({} path)",
                detection.source
            )));
        }

        // Separating
        check_cancelled(cancel)?;
        state.enter(PipelineState::Separating, tracker);
        let stage_start = Instant::now();
        let separation = {
            let _span = span!(
                Level::DEBUG,
                "separation",
                people = detection.len(),
                keep = self.options.target_foreground_count
            )
            .entered();
            separate(&detection, self.options.target_foreground_count)
        };
        state.timings.separation_ms = stage_start.elapsed().as_millis() as u64;
        state.details.foreground_people = separation.foreground_masks.len();
        state.details.background_people = separation.background_masks.len();

        if !separation.needs_removal() {
            info!(
                foreground = state.details.foreground_people,
                "Nobody to remove, returning the original image"
            );
            state.details.inpainting_model = NO_INPAINTING_MODEL.to_string();
            state.enter(PipelineState::NoRemovalNeeded, tracker);
            return Ok(image_url.to_string());
        }

        // MaskGenerating
        check_cancelled(cancel)?;
        state.enter(PipelineState::MaskGenerating, tracker);
        let stage_start = Instant::now();
        let mask = {
            let _span = span!(
                Level::DEBUG,
                "mask_generation",
                regions = separation.background_masks.len(),
                width = detection.image_width,
                height = detection.image_height
            )
            .entered();
            self.mask_generator
                .generate(
                    &separation.background_masks,
                    detection.image_width,
                    detection.image_height,
                )?
                .ok_or_else(|| {
                    PersonRemovalError::mask_generation("empty mask for a non-empty background set")
                })?
        };
        state.timings.mask_generation_ms = stage_start.elapsed().as_millis() as u64;

        // Inpainting
        state.enter(PipelineState::Inpainting, tracker);
        let prompt =
            build_prompt(self.options.custom_prompt.as_deref(), self.options.scene_context);
        let stage_start = Instant::now();
        let filled = guarded(
            cancel,
            self.selector
                .fill(
                    image_url,
                    &mask,
                    &prompt,
                    self.options.preferred_inpainting_model.as_deref(),
                )
                .instrument(span!(Level::INFO, "inpainting", regions = mask.regions.len())),
        )
        .await?;
        state.timings.inpainting_ms = stage_start.elapsed().as_millis() as u64;
        state.details.inpainting_model = filled.model_used;

        // Validating
        check_cancelled(cancel)?;
        state.enter(PipelineState::Validating, tracker);
        let stage_start = Instant::now();
        self.validator.validate(image_url, &filled.result_url)?;
        state.timings.validation_ms = stage_start.elapsed().as_millis() as u64;

        Ok(filled.result_url)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PersonRemovalError::cancelled("Person removal was cancelled"));
    }
    Ok(())
}

/// Race `operation` against cancellation
async fn guarded<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            Err(PersonRemovalError::cancelled("Person removal was cancelled"))
        },
        result = operation => result,
    }
}

#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Person Removal Library
//!
//! Detects people in a photograph, ranks them by how likely they are to be
//! the intended subject, and removes everyone else with generative fill.
//!
//! All models are reached through remote capabilities (segmentation, person
//! detection, box-prompted refinement and inpainting), so this crate is the
//! orchestration layer: it owns scoring, separation, mask construction,
//! back-end selection, retries and cancellation, and reports every run as a
//! structured [`PersonRemovalResult`].
//!
//! ## Features
//!
//! - **Two detection paths**: promptable segmentation, with a box detector plus
//!   refiner chain as fallback
//! - **Foreground scoring**: five weighted geometric and confidence factors
//! - **Region union masks**: every removed person contributes to the fill mask
//! - **Inpainting registry**: named back-ends tried in priority order
//! - **Bounded retries** with exponential backoff, per-call timeouts and
//!   cooperative cancellation
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_person_removal::{
//!     remove_people, HttpServiceFactory, PersonRemovalOptions, ServiceConfig, ServiceFactory,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::from_file("services.json")?;
//! let services = HttpServiceFactory::new(config, Duration::from_secs(60)).create_services()?;
//!
//! let options = PersonRemovalOptions::builder()
//!     .target_foreground_count(1)
//!     .preferred_inpainting_model("lama")
//!     .build()?;
//!
//! let result = remove_people("https://images.example.com/beach.jpg", services, options).await;
//! if result.success {
//!     println!("Cleaned image: {}", result.result_url.unwrap_or_default());
//! } else {
//!     eprintln!("Failed: {}", result.error.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing with mock services
//!
//! ```rust
//! use imgly_person_removal::{
//!     backends::mock::{MockInpainter, MockSegmenter},
//!     BoundingBox, PersonRemovalOptions, PersonRemovalProcessor, PipelineServices,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> imgly_person_removal::Result<()> {
//! let people = [
//!     BoundingBox::new(400.0, 300.0, 200.0, 400.0),
//!     BoundingBox::new(0.0, 0.0, 80.0, 160.0),
//! ];
//! let segmenter = MockSegmenter::with_people(1000, 1000, &people);
//! let services = PipelineServices::builder(Arc::new(segmenter))
//!     .inpainter(Arc::new(MockInpainter::succeeding("lama", "https://cdn.example.com/out.png")))
//!     .build()?;
//!
//! let processor = PersonRemovalProcessor::new(services, PersonRemovalOptions::default())?;
//! let result = processor.run("https://images.example.com/street.jpg").await;
//! assert_eq!(result.details.background_people, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bar and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod inference;
pub mod inpainting;
pub mod mask;
pub mod processor;
pub mod scoring;
pub mod separation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::{
    HttpInpainter, HttpMaskRefiner, HttpPersonDetector, HttpSegmenter, HttpServiceFactory,
    MockServiceFactory,
};
pub use config::{
    EndpointConfig, NamedEndpoint, PersonDetectorParams, PersonRemovalOptions,
    PersonRemovalOptionsBuilder, RetryPolicy, SceneContext, SegmentationParams, ServiceConfig,
    TimeoutConfig,
};
pub use detection::{detect_with_fallback, DetectionStrategy, FallbackDetection, PrimaryDetection};
pub use error::{ErrorKind, PersonRemovalError, Result};
pub use inference::{
    Inpainter, InpainterRegistry, InpaintRequest, MaskRefiner, PersonDetector, Segmenter,
};
pub use inpainting::{augment_prompt, build_prompt, InpaintOutcome, InpaintingSelector};
pub use mask::{combine_masks, generate_mask, InpaintingMask, MaskGenerator, MaskUnion};
pub use processor::{
    PersonRemovalProcessor, PipelineOutcome, PipelineServices, PipelineServicesBuilder,
    PipelineState, ServiceFactory,
};
pub use scoring::score;
pub use separation::{separate, SeparationResult};
pub use services::{
    progress_for, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate, StageProgress,
};
pub use types::{
    BoundingBox, DetectionResult, DetectionSource, ForegroundScore, MaskRef, PersonMask,
    PersonRemovalResult, Point, RemovalDetails, ScoreFactors, StageTimings,
};
pub use utils::{ResultValidator, UrlResultValidator};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, init_cli_tracing, init_library_tracing, spans, TracingConfig, TracingFormat,
};

/// Remove background people from the image at `image_url`
///
/// Convenience wrapper around [`PersonRemovalProcessor`]. It never returns an
/// error: invalid options are reported as an unsuccessful result with
/// `error_kind == ErrorKind::InvalidConfig` and zero attempts.
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_person_removal::{
///     remove_people, MockServiceFactory, PersonRemovalOptions, ServiceFactory,
/// };
///
/// # async fn example() -> anyhow::Result<()> {
/// let services = MockServiceFactory::new().create_services()?;
/// let options = PersonRemovalOptions::default();
/// let result = remove_people("https://images.example.com/plaza.jpg", services, options).await;
/// println!("{}", serde_json::to_string_pretty(&result)?);
/// # Ok(())
/// # }
/// ```
pub async fn remove_people(
    image_url: &str,
    services: PipelineServices,
    options: PersonRemovalOptions,
) -> PersonRemovalResult {
    match PersonRemovalProcessor::new(services, options) {
        Ok(processor) => processor.run(image_url).await,
        Err(error) => {
            tracing::warn!(error = %error, "Rejected person removal options");
            PersonRemovalResult::failed(
                &error,
                RemovalDetails::default(),
                0,
                StageTimings::default(),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockInpainter, MockSegmenter};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_remove_people_reports_invalid_options() {
        let services = PipelineServices::builder(Arc::new(MockSegmenter::empty(10, 10)))
            .inpainter(Arc::new(MockInpainter::succeeding("lama", "https://cdn/out.png")))
            .build()
            .unwrap();
        let mut options = PersonRemovalOptions::default();
        options.retry.max_attempts = 42;

        let result = remove_people("https://img/a.jpg", services, options).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidConfig));
        assert_eq!(result.attempts, 0);
        assert!(result.error.unwrap().contains("maxRetries"));
    }

    #[tokio::test]
    async fn test_remove_people_with_mock_factory() {
        let services = MockServiceFactory::new().create_services().unwrap();
        let options = PersonRemovalOptions::default();
        let result = remove_people("https://images.example.com/plaza.jpg", services, options).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.details.people_detected, 3);
        assert_eq!(result.details.background_people, 2);
        assert_eq!(result.details.inpainting_model, "mock-inpainter");
    }
}

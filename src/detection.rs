//! Person detection strategies
//!
//! Two interchangeable ways to turn an image URL into a [`DetectionResult`]:
//! a single promptable segmentation call, and a fallback chain that runs a
//! person box detector and refines every box into a mask.

use crate::{
    config::{PersonDetectorParams, SegmentationParams, FALLBACK_IMAGE_DIMENSIONS},
    error::{PersonRemovalError, Result},
    inference::{with_call_timeout, MaskRefiner, PersonDetector, RawBox, Segmenter},
    types::{BoundingBox, DetectionResult, DetectionSource, PersonMask},
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A way of detecting people in an image
#[async_trait]
pub trait DetectionStrategy: Send + Sync {
    /// Which path this strategy represents
    fn source(&self) -> DetectionSource;

    /// Detect every person in the image
    ///
    /// An empty result is not an error.
    ///
    /// # Errors
    /// - The underlying capability failed or timed out
    async fn detect(&self, image_url: &str) -> Result<DetectionResult>;
}

/// Single call to the promptable segmentation capability
pub struct PrimaryDetection {
    segmenter: Arc<dyn Segmenter>,
    params: SegmentationParams,
    call_timeout: Duration,
}

impl PrimaryDetection {
    #[must_use]
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        params: SegmentationParams,
        call_timeout: Duration,
    ) -> Self {
        Self {
            segmenter,
            params,
            call_timeout,
        }
    }
}

#[async_trait]
impl DetectionStrategy for PrimaryDetection {
    fn source(&self) -> DetectionSource {
        DetectionSource::PrimarySegmentation
    }

    #[instrument(skip(self), fields(segmenter = %self.segmenter.name()))]
    async fn detect(&self, image_url: &str) -> Result<DetectionResult> {
        let output = with_call_timeout(
            self.call_timeout,
            "segmentation",
            self.segmenter.segment(image_url, &self.params),
        )
        .await?;

        let total = output.segments.len();
        let mut masks = Vec::with_capacity(total);
        for segment in output.segments {
            let confidence = segment.effective_confidence();
            if confidence <= self.params.confidence_threshold {
                continue;
            }
            let Some(mask) = segment.mask else {
                debug!("Dropping segment without a mask reference");
                continue;
            };
            let bbox = segment.bbox.unwrap_or_else(BoundingBox::unit);
            masks.push(PersonMask::new(format!("person_{}", masks.len()), mask, bbox, confidence));
        }

        debug!(raw = total, kept = masks.len(), "Primary segmentation finished");
        let (width, height) = resolve_dimensions(output.image_dimensions);
        Ok(DetectionResult::new(masks, width, height, self.source()))
    }
}

/// Box detector followed by one refinement call per box
///
/// Refinement failures drop that box only. Ids are `person_{box index}`, so
/// they do not depend on completion order when refinement runs concurrently.
pub struct FallbackDetection {
    detector: Arc<dyn PersonDetector>,
    refiner: Arc<dyn MaskRefiner>,
    params: PersonDetectorParams,
    call_timeout: Duration,
    parallel: bool,
}

impl FallbackDetection {
    #[must_use]
    pub fn new(
        detector: Arc<dyn PersonDetector>,
        refiner: Arc<dyn MaskRefiner>,
        params: PersonDetectorParams,
        call_timeout: Duration,
    ) -> Self {
        Self {
            detector,
            refiner,
            params,
            call_timeout,
            parallel: false,
        }
    }

    /// Issue refinement calls concurrently instead of one at a time
    #[must_use]
    pub fn with_parallel_refinement(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    async fn refine_box(&self, image_url: &str, index: usize, raw: &RawBox) -> Option<PersonMask> {
        let refined = with_call_timeout(
            self.call_timeout,
            "mask refinement",
            self.refiner.refine(image_url, &raw.bbox),
        )
        .await;

        match refined {
            Ok(Some(mask)) => Some(PersonMask::new(
                format!("person_{}", index),
                mask,
                raw.bbox,
                raw.effective_confidence(),
            )),
            Ok(None) => {
                debug!(index, "Refiner returned no mask for box");
                None
            },
            Err(e) => {
                warn!(index, error = %e, "Mask refinement failed, skipping box");
                None
            },
        }
    }
}

#[async_trait]
impl DetectionStrategy for FallbackDetection {
    fn source(&self) -> DetectionSource {
        DetectionSource::BoxDetectorRefiner
    }

    #[instrument(
        skip(self),
        fields(
            detector = %self.detector.name(),
            refiner = %self.refiner.name(),
            parallel = self.parallel
        )
    )]
    async fn detect(&self, image_url: &str) -> Result<DetectionResult> {
        let detections = with_call_timeout(
            self.call_timeout,
            "person detection",
            self.detector.detect_persons(image_url, &self.params),
        )
        .await?;

        let boxes: Vec<(usize, &RawBox)> = detections
            .boxes
            .iter()
            .enumerate()
            .filter(|(_, raw)| raw.effective_confidence() >= self.params.confidence_threshold)
            .collect();

        let masks: Vec<PersonMask> = if self.parallel {
            join_all(
                boxes
                    .iter()
                    .map(|(index, raw)| self.refine_box(image_url, *index, raw)),
            )
            .await
            .into_iter()
            .flatten()
            .collect()
        } else {
            let mut masks = Vec::with_capacity(boxes.len());
            for (index, raw) in &boxes {
                if let Some(mask) = self.refine_box(image_url, *index, raw).await {
                    masks.push(mask);
                }
            }
            masks
        };

        debug!(boxes = boxes.len(), refined = masks.len(), "Fallback detection finished");
        let (width, height) = resolve_dimensions(detections.image_dimensions);
        Ok(DetectionResult::new(masks, width, height, self.source()))
    }
}

fn resolve_dimensions(reported: Option<(u32, u32)>) -> (u32, u32) {
    match reported {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => {
            warn!(
                width = FALLBACK_IMAGE_DIMENSIONS.0,
                height = FALLBACK_IMAGE_DIMENSIONS.1,
                "Back-end did not report image dimensions, using fallback"
            );
            FALLBACK_IMAGE_DIMENSIONS
        },
    }
}

/// Run `primary`, falling back to `fallback` when it fails
///
/// # Errors
/// - `Detection` when the primary fails and no fallback is available, or both fail
/// - `Cancelled`/`InvalidConfig` from the primary are returned unchanged
pub async fn detect_with_fallback(
    primary: &dyn DetectionStrategy,
    fallback: Option<&dyn DetectionStrategy>,
    image_url: &str,
) -> Result<DetectionResult> {
    let primary_error = match primary.detect(image_url).await {
        Ok(result) => return Ok(result),
        Err(e) if !e.is_retryable() => return Err(e),
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        return Err(PersonRemovalError::detection(format!(
            "{} failed: {}",
            primary.source(),
            primary_error
        )));
    };

    warn!(
        error = %primary_error,
        fallback = %fallback.source(),
        "Primary detection failed, trying fallback"
    );
    fallback.detect(image_url).await.map_err(|fallback_error| {
        PersonRemovalError::detection(format!(
            "{} failed: {}; {} failed: {}",
            primary.source(),
            primary_error,
            fallback.source(),
            fallback_error
        ))
    })
}

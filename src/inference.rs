//! Remote capability abstractions and the inpainting back-end registry
//!
//! Every model the pipeline depends on is reached through one of the traits in
//! this module. Concrete clients live in [`crate::backends`]; the pipeline only
//! sees trait objects, so tests can inject scripted doubles.

use crate::{
    config::{PersonDetectorParams, SegmentationParams, DEFAULT_CONFIDENCE},
    error::{PersonRemovalError, Result},
    mask::InpaintingMask,
    types::{BoundingBox, MaskRef},
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One region returned by the promptable segmentation capability
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub bbox: Option<BoundingBox>,
    pub mask: Option<MaskRef>,
    pub confidence: Option<f64>,
}

impl RawSegment {
    /// Confidence with malformed or missing values replaced by the default
    #[must_use]
    pub fn effective_confidence(&self) -> f64 {
        sanitize_confidence(self.confidence)
    }
}

/// Output of a segmentation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationOutput {
    pub segments: Vec<RawSegment>,
    /// True image dimensions, when the back-end reports them
    pub image_dimensions: Option<(u32, u32)>,
}

/// One person box from the bounding-box detector
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
    pub bbox: BoundingBox,
    pub confidence: Option<f64>,
}

impl RawBox {
    #[must_use]
    pub fn effective_confidence(&self) -> f64 {
        sanitize_confidence(self.confidence)
    }
}

/// Output of a person detection call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxDetections {
    pub boxes: Vec<RawBox>,
    pub image_dimensions: Option<(u32, u32)>,
}

/// Everything an inpainting back-end needs to fill one image
#[derive(Debug, Clone, Copy)]
pub struct InpaintRequest<'a> {
    pub image_url: &'a str,
    pub mask: &'a InpaintingMask,
    pub prompt: &'a str,
}

/// Promptable instance segmentation
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Name used in logs and results
    fn name(&self) -> &str;

    /// Segment every instance in the image
    ///
    /// # Errors
    /// - Transport or service failures
    /// - Malformed responses
    async fn segment(
        &self,
        image_url: &str,
        params: &SegmentationParams,
    ) -> Result<SegmentationOutput>;
}

/// Bounding-box detector restricted to a single object class
#[async_trait]
pub trait PersonDetector: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// - Transport or service failures
    async fn detect_persons(
        &self,
        image_url: &str,
        params: &PersonDetectorParams,
    ) -> Result<BoxDetections>;
}

/// Single-instance segmentation prompted by a box
#[async_trait]
pub trait MaskRefiner: Send + Sync {
    fn name(&self) -> &str;

    /// Refine one box into a mask; `Ok(None)` when the back-end found nothing
    ///
    /// # Errors
    /// - Transport or service failures
    async fn refine(&self, image_url: &str, box_prompt: &BoundingBox) -> Result<Option<MaskRef>>;
}

/// Prompt-driven generative fill
#[async_trait]
pub trait Inpainter: Send + Sync {
    /// Registry key for this back-end
    fn name(&self) -> &str;

    /// Fill the masked region and return the URL of the result
    ///
    /// # Errors
    /// - Transport or service failures
    /// - Back-end produced no output
    async fn fill(&self, request: InpaintRequest<'_>) -> Result<String>;
}

/// Named inpainting strategies in priority order
#[derive(Clone, Default)]
pub struct InpainterRegistry {
    entries: Vec<Arc<dyn Inpainter>>,
}

impl InpainterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a back-end at the end of the priority list
    ///
    /// Registering a name that already exists replaces it in place.
    pub fn register(&mut self, inpainter: Arc<dyn Inpainter>) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|existing| existing.name() == inpainter.name())
        {
            *slot = inpainter;
        } else {
            self.entries.push(inpainter);
        }
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, inpainter: Arc<dyn Inpainter>) -> Self {
        self.register(inpainter);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Inpainter>> {
        self.entries.iter().find(|i| i.name() == name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|i| i.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order in which back-ends are attempted
    ///
    /// The preferred back-end goes first, followed by the full priority list.
    /// With `dedupe` the preferred back-end is not repeated in the list.
    /// An unknown preferred name is ignored.
    #[must_use]
    pub fn attempt_order(&self, preferred: Option<&str>, dedupe: bool) -> Vec<Arc<dyn Inpainter>> {
        let preferred = preferred.and_then(|name| {
            let found = self.get(name);
            if found.is_none() {
                tracing::warn!(model = %name, "Preferred inpainting model is not registered");
            }
            found
        });

        let mut order = Vec::with_capacity(self.entries.len() + 1);
        if let Some(first) = &preferred {
            order.push(Arc::clone(first));
        }
        for entry in &self.entries {
            let skip = dedupe
                && preferred
                    .as_ref()
                    .is_some_and(|first| first.name() == entry.name());
            if !skip {
                order.push(Arc::clone(entry));
            }
        }
        order
    }
}

impl std::fmt::Debug for InpainterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpainterRegistry")
            .field("entries", &self.names())
            .finish()
    }
}

/// Replace missing, non-finite or out-of-range confidences with the default
pub(crate) fn sanitize_confidence(confidence: Option<f64>) -> f64 {
    match confidence {
        Some(value) if value.is_finite() && (0.0..=1.0).contains(&value) => value,
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Bound a remote call by `timeout`
pub(crate) async fn with_call_timeout<T, F>(
    timeout: Duration,
    operation: &str,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(PersonRemovalError::timeout(format!(
            "{} exceeded {} ms",
            operation,
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockInpainter;

    fn registry() -> InpainterRegistry {
        InpainterRegistry::new()
            .with(Arc::new(MockInpainter::succeeding("lama", "https://cdn/lama.png")))
            .with(Arc::new(MockInpainter::succeeding("sdxl", "https://cdn/sdxl.png")))
            .with(Arc::new(MockInpainter::succeeding("flux", "https://cdn/flux.png")))
    }

    fn names(order: &[Arc<dyn Inpainter>]) -> Vec<String> {
        order.iter().map(|i| i.name().to_string()).collect()
    }

    #[test]
    fn test_registry_registration_and_lookup() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["lama", "sdxl", "flux"]);
        assert!(registry.get("sdxl").is_some());
        assert!(registry.get("invalid").is_none());
    }

    #[test]
    fn test_registry_replacement_keeps_position() {
        let mut registry = registry();
        registry.register(Arc::new(MockInpainter::failing("sdxl", "replaced")));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["lama", "sdxl", "flux"]);
    }

    #[test]
    fn test_attempt_order_without_preference() {
        let order = registry().attempt_order(None, false);
        assert_eq!(names(&order), vec!["lama", "sdxl", "flux"]);
    }

    #[test]
    fn test_attempt_order_repeats_preferred_by_default() {
        let order = registry().attempt_order(Some("flux"), false);
        assert_eq!(names(&order), vec!["flux", "lama", "sdxl", "flux"]);
    }

    #[test]
    fn test_attempt_order_with_dedupe() {
        let order = registry().attempt_order(Some("flux"), true);
        assert_eq!(names(&order), vec!["flux", "lama", "sdxl"]);
    }

    #[test]
    fn test_attempt_order_ignores_unknown_preference() {
        let order = registry().attempt_order(Some("dalle"), false);
        assert_eq!(names(&order), vec!["lama", "sdxl", "flux"]);
    }

    #[test]
    fn test_sanitize_confidence() {
        assert_eq!(sanitize_confidence(Some(0.7)), 0.7);
        assert_eq!(sanitize_confidence(None), DEFAULT_CONFIDENCE);
        assert_eq!(sanitize_confidence(Some(f64::NAN)), DEFAULT_CONFIDENCE);
        assert_eq!(sanitize_confidence(Some(3.5)), DEFAULT_CONFIDENCE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_fires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, PersonRemovalError>(())
        };
        let err = with_call_timeout(Duration::from_secs(1), "segment", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, PersonRemovalError::Timeout(_)));
        assert!(err.to_string().contains("segment"));
    }
}

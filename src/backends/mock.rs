//! Scripted capability back-ends
//!
//! These doubles implement the capability traits without any network access.
//! Each one counts its calls and can be scripted to fail, fail for a number
//! of calls, or stall, so the pipeline's retry, fallback and timeout paths can
//! be exercised deterministically. The CLI `--dry-run` mode uses them too.

use crate::{
    config::{PersonDetectorParams, SegmentationParams},
    error::{PersonRemovalError, Result},
    inference::{
        BoxDetections, InpaintRequest, Inpainter, InpainterRegistry, MaskRefiner, PersonDetector,
        RawBox, RawSegment, SegmentationOutput, Segmenter,
    },
    mask::InpaintingMask,
    processor::{PipelineServices, ServiceFactory},
    types::{BoundingBox, MaskRef},
    utils::AcceptAllValidator,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure script shared by every mock
#[derive(Debug, Clone, Default)]
struct Script {
    /// Fail every call with this message
    failure: Option<String>,
    /// Fail this many leading calls, then behave normally
    fail_first: usize,
    /// Sleep before answering
    delay: Option<Duration>,
}

impl Script {
    /// Register one call and return the scripted failure, if any
    async fn enter(&self, calls: &AtomicUsize, backend: &str, operation: &str) -> Result<()> {
        let call_index = calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(PersonRemovalError::backend_failure(backend, operation, message));
        }
        if call_index < self.fail_first {
            return Err(PersonRemovalError::backend_failure(
                backend,
                operation,
                &format!("scripted failure {} of {}", call_index + 1, self.fail_first),
            ));
        }
        Ok(())
    }
}

/// Mock promptable segmentation back-end
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    image_dimensions: Option<(u32, u32)>,
    segments: Vec<RawSegment>,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl MockSegmenter {
    /// Segmenter that always returns `segments`
    #[must_use]
    pub fn with_segments(image_dimensions: Option<(u32, u32)>, segments: Vec<RawSegment>) -> Self {
        Self {
            image_dimensions,
            segments,
            script: Script::default(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Segmenter that finds one confident person per box
    #[must_use]
    pub fn with_people(image_width: u32, image_height: u32, people: &[BoundingBox]) -> Self {
        let segments = people
            .iter()
            .enumerate()
            .map(|(index, bbox)| RawSegment {
                bbox: Some(*bbox),
                mask: Some(MaskRef::new(format!("mask://segment-{}", index))),
                confidence: Some(0.95),
            })
            .collect();
        Self::with_segments(Some((image_width, image_height)), segments)
    }

    /// Segmenter that finds nobody
    #[must_use]
    pub fn empty(image_width: u32, image_height: u32) -> Self {
        Self::with_segments(Some((image_width, image_height)), Vec::new())
    }

    /// Segmenter whose every call fails
    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        let mut segmenter = Self::with_segments(None, Vec::new());
        segmenter.script.failure = Some(message.into());
        segmenter
    }

    /// Fail the first `count` calls
    #[must_use]
    pub fn failing_first(mut self, count: usize) -> Self {
        self.script.fail_first = count;
        self
    }

    /// Stall every call for `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    /// Shared call counter, readable after the mock is moved into the pipeline
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Segmenter for MockSegmenter {
    fn name(&self) -> &str {
        "mock-segmenter"
    }

    async fn segment(
        &self,
        _image_url: &str,
        _params: &SegmentationParams,
    ) -> Result<SegmentationOutput> {
        self.script.enter(&self.calls, self.name(), "segment").await?;
        Ok(SegmentationOutput {
            segments: self.segments.clone(),
            image_dimensions: self.image_dimensions,
        })
    }
}

/// Mock bounding-box person detector
#[derive(Debug, Clone)]
pub struct MockPersonDetector {
    image_dimensions: Option<(u32, u32)>,
    boxes: Vec<RawBox>,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl MockPersonDetector {
    /// Detector that returns every box with confidence 0.9
    #[must_use]
    pub fn with_boxes(image_dimensions: Option<(u32, u32)>, boxes: Vec<BoundingBox>) -> Self {
        Self::with_raw_boxes(
            image_dimensions,
            boxes
                .into_iter()
                .map(|bbox| RawBox {
                    bbox,
                    confidence: Some(0.9),
                })
                .collect(),
        )
    }

    /// Detector that returns `boxes` unchanged
    #[must_use]
    pub fn with_raw_boxes(image_dimensions: Option<(u32, u32)>, boxes: Vec<RawBox>) -> Self {
        Self {
            image_dimensions,
            boxes,
            script: Script::default(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        let mut detector = Self::with_raw_boxes(None, Vec::new());
        detector.script.failure = Some(message.into());
        detector
    }

    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PersonDetector for MockPersonDetector {
    fn name(&self) -> &str {
        "mock-person-detector"
    }

    async fn detect_persons(
        &self,
        _image_url: &str,
        _params: &PersonDetectorParams,
    ) -> Result<BoxDetections> {
        self.script.enter(&self.calls, self.name(), "detect persons").await?;
        Ok(BoxDetections {
            boxes: self.boxes.clone(),
            image_dimensions: self.image_dimensions,
        })
    }
}

/// Mock box-prompted refiner
///
/// Returns `mask://refined-{x}-{y}` for every box unless the box is scripted
/// to fail or to come back empty.
#[derive(Debug, Clone, Default)]
pub struct MockMaskRefiner {
    failing_boxes: Vec<BoundingBox>,
    missing_boxes: Vec<BoundingBox>,
    fail_all: bool,
    calls: Arc<AtomicUsize>,
}

impl MockMaskRefiner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail refinement of `bbox`
    #[must_use]
    pub fn failing_for(mut self, bbox: BoundingBox) -> Self {
        self.failing_boxes.push(bbox);
        self
    }

    /// Return no mask for `bbox`
    #[must_use]
    pub fn missing_for(mut self, bbox: BoundingBox) -> Self {
        self.missing_boxes.push(bbox);
        self
    }

    /// Fail every refinement
    #[must_use]
    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MaskRefiner for MockMaskRefiner {
    fn name(&self) -> &str {
        "mock-refiner"
    }

    async fn refine(&self, _image_url: &str, box_prompt: &BoundingBox) -> Result<Option<MaskRef>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.failing_boxes.contains(box_prompt) {
            return Err(PersonRemovalError::backend_failure(
                self.name(),
                "refine",
                "scripted failure",
            ));
        }
        if self.missing_boxes.contains(box_prompt) {
            return Ok(None);
        }
        Ok(Some(MaskRef::new(format!(
            "mask://refined-{}-{}",
            box_prompt.x, box_prompt.y
        ))))
    }
}

/// Mock generative-fill back-end
#[derive(Debug, Clone)]
pub struct MockInpainter {
    name: String,
    result_url: String,
    script: Script,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    masks: Arc<Mutex<Vec<InpaintingMask>>>,
}

impl MockInpainter {
    /// Inpainter that always returns `result_url`
    #[must_use]
    pub fn succeeding<N: Into<String>, U: Into<String>>(name: N, result_url: U) -> Self {
        Self {
            name: name.into(),
            result_url: result_url.into(),
            script: Script::default(),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            masks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Inpainter whose every call fails with `message`
    #[must_use]
    pub fn failing<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        let mut inpainter = Self::succeeding(name, String::new());
        inpainter.script.failure = Some(message.into());
        inpainter
    }

    /// Fail the first `count` calls
    #[must_use]
    pub fn failing_first(mut self, count: usize) -> Self {
        self.script.fail_first = count;
        self
    }

    /// Stall every call for `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Prompts received so far, shared with clones
    #[must_use]
    pub fn prompt_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }

    /// Fill masks received so far, shared with clones
    #[must_use]
    pub fn mask_history(&self) -> Arc<Mutex<Vec<InpaintingMask>>> {
        Arc::clone(&self.masks)
    }
}

#[async_trait]
impl Inpainter for MockInpainter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fill(&self, request: InpaintRequest<'_>) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.to_string());
        }
        if let Ok(mut masks) = self.masks.lock() {
            masks.push(request.mask.clone());
        }
        self.script.enter(&self.calls, &self.name, "inpaint").await?;
        Ok(self.result_url.clone())
    }
}

/// Offline service set for dry runs
///
/// Every image is treated as a 1024x768 scene with one centered subject and
/// two people near the edges; inpainting echoes a `mock://` URL, so result
/// validation accepts anything.
#[derive(Debug, Clone, Default)]
pub struct MockServiceFactory;

impl MockServiceFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn scene() -> Vec<BoundingBox> {
        vec![
            BoundingBox::new(362.0, 134.0, 300.0, 600.0),
            BoundingBox::new(20.0, 300.0, 90.0, 220.0),
            BoundingBox::new(900.0, 320.0, 80.0, 200.0),
        ]
    }
}

impl ServiceFactory for MockServiceFactory {
    fn create_services(&self) -> Result<PipelineServices> {
        let scene = Self::scene();
        PipelineServices::builder(Arc::new(MockSegmenter::with_people(1024, 768, &scene)))
            .fallback(
                Arc::new(MockPersonDetector::with_boxes(Some((1024, 768)), scene)),
                Arc::new(MockMaskRefiner::new()),
            )
            .inpainters(InpainterRegistry::new().with(Arc::new(MockInpainter::succeeding(
                "mock-inpainter",
                "mock://inpainted/result.png",
            ))))
            .validator(Arc::new(AcceptAllValidator))
            .build()
    }

    fn description(&self) -> String {
        "mock services (dry run)".to_string()
    }
}

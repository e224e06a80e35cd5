//! End-to-end pipeline scenarios against scripted back-ends
//!
//! Every test wires mock capabilities into a real `PersonRemovalProcessor`
//! and checks the structured result the caller would see.

use imgly_person_removal::{
    backends::mock::{MockInpainter, MockMaskRefiner, MockPersonDetector, MockSegmenter},
    BoundingBox, ErrorKind, InpainterRegistry, MaskRef, PersonRemovalOptions,
    PersonRemovalProcessor, PipelineServices,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const IMAGE_URL: &str = "https://images.example.com/beach.jpg";
const CLEAN_URL: &str = "https://cdn.example.com/beach-clean.png";

/// 15% of a 1000x1000 frame, centered
fn centered_subject() -> BoundingBox {
    BoundingBox::new(350.0, 250.0, 300.0, 500.0)
}

/// 20% of a 1000x1000 frame, centered
fn large_centered_subject() -> BoundingBox {
    BoundingBox::new(300.0, 250.0, 400.0, 500.0)
}

/// 2% of a 1000x1000 frame, top-left corner
fn corner_bystander() -> BoundingBox {
    BoundingBox::new(0.0, 0.0, 100.0, 200.0)
}

fn processor(services: PipelineServices, options: PersonRemovalOptions) -> PersonRemovalProcessor {
    PersonRemovalProcessor::new(services, options).expect("valid options")
}

#[tokio::test]
async fn test_single_subject_returns_original_image() {
    let inpainter = MockInpainter::succeeding("lama", CLEAN_URL);
    let inpaint_calls = inpainter.call_counter();
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[centered_subject()],
    )))
    .inpainter(Arc::new(inpainter))
    .build()
    .unwrap();

    let result = processor(services, PersonRemovalOptions::default())
        .run(IMAGE_URL)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.result_url.as_deref(), Some(IMAGE_URL));
    assert_eq!(result.details.people_detected, 1);
    assert_eq!(result.details.foreground_people, 1);
    assert_eq!(result.details.background_people, 0);
    assert_eq!(result.details.inpainting_model, "none");
    assert_eq!(result.attempts, 1);
    assert_eq!(inpaint_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_corner_bystander_is_removed() {
    let inpainter = MockInpainter::succeeding("lama", CLEAN_URL);
    let masks = inpainter.mask_history();
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[corner_bystander(), large_centered_subject()],
    )))
    .inpainter(Arc::new(inpainter))
    .build()
    .unwrap();

    let result = processor(services, PersonRemovalOptions::default())
        .run(IMAGE_URL)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.result_url.as_deref(), Some(CLEAN_URL));
    assert_eq!(result.details.people_detected, 2);
    assert_eq!(result.details.foreground_people, 1);
    assert_eq!(result.details.background_people, 1);
    assert_eq!(result.details.model_used, "primary-segmentation");
    assert_eq!(result.details.inpainting_model, "lama");

    // Only the bystander (person_0) reaches the fill mask
    let masks = masks.lock().unwrap();
    assert_eq!(masks.len(), 1);
    let mask = &masks[0];
    assert!(!mask.regions.is_empty());
    assert_eq!(mask.regions.len(), 1);
    assert!(mask.regions.contains("person_0"));
    assert!(!mask.regions.contains("person_1"));
    assert_eq!(mask.regions.mask_refs(), vec![&MaskRef::new("mask://segment-0")]);

    let corner = corner_bystander();
    assert!(mask.fill_boxes().iter().any(|fill| {
        fill.x <= corner.x
            && fill.y <= corner.y
            && fill.right() >= corner.right()
            && fill.bottom() >= corner.bottom()
    }));
    assert!(!mask.fill_boxes().iter().any(|fill| fill.right() > 400.0));
}

#[tokio::test]
async fn test_fallback_detection_after_segmentation_failure() {
    let segmenter = MockSegmenter::failing("segmentation service unavailable");
    let detector = MockPersonDetector::with_boxes(Some((1000, 1000)), vec![centered_subject()]);
    let refiner = MockMaskRefiner::new();
    let refine_calls = refiner.call_counter();

    let services = PipelineServices::builder(Arc::new(segmenter))
        .fallback(Arc::new(detector), Arc::new(refiner))
        .inpainter(Arc::new(MockInpainter::succeeding("lama", CLEAN_URL)))
        .build()
        .unwrap();

    let result = processor(services, PersonRemovalOptions::default())
        .run(IMAGE_URL)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.details.model_used, "box-detector+refiner");
    assert_eq!(result.details.people_detected, 1);
    assert_eq!(result.result_url.as_deref(), Some(IMAGE_URL));
    assert_eq!(refine_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_inpainters_failing_exhausts_retries() {
    let lama = MockInpainter::failing("lama", "GPU out of memory");
    let sdxl = MockInpainter::failing("sdxl", "quota exceeded");
    let lama_calls = lama.call_counter();
    let sdxl_calls = sdxl.call_counter();

    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainters(InpainterRegistry::new().with(Arc::new(lama)).with(Arc::new(sdxl)))
    .build()
    .unwrap();

    let options = PersonRemovalOptions::builder().max_retries(3).build().unwrap();
    let result = processor(services, options).run(IMAGE_URL).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.error_kind, Some(ErrorKind::Inpainting));
    assert!(!result.error.as_deref().unwrap_or_default().is_empty());
    assert!(result.result_url.is_none());
    assert_eq!(lama_calls.load(Ordering::SeqCst), 3);
    assert_eq!(sdxl_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_total_attempts() {
    for max_attempts in [1, 2, 4] {
        let segmenter = MockSegmenter::with_people(1000, 1000, &[centered_subject()])
            .failing_first(max_attempts as usize);
        let calls = segmenter.call_counter();
        let services = PipelineServices::builder(Arc::new(segmenter))
            .inpainter(Arc::new(MockInpainter::succeeding("lama", CLEAN_URL)))
            .build()
            .unwrap();

        let options = PersonRemovalOptions::builder()
            .max_retries(max_attempts)
            .build()
            .unwrap();
        let result = processor(services, options).run(IMAGE_URL).await;

        assert!(!result.success);
        assert_eq!(result.attempts, max_attempts);
        assert_eq!(result.error_kind, Some(ErrorKind::Detection));
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts as usize);

        // Each attempt fails differently; the reported error is the last one
        let error = result.error.unwrap_or_default();
        let last = format!("scripted failure {max_attempts} of {max_attempts}");
        assert!(error.contains(&last), "{error}");
        if max_attempts > 1 {
            assert!(!error.contains("scripted failure 1 of"), "{error}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_between_attempts() {
    let services = PipelineServices::builder(Arc::new(MockSegmenter::failing("boom")))
        .inpainter(Arc::new(MockInpainter::succeeding("lama", CLEAN_URL)))
        .build()
        .unwrap();
    let options = PersonRemovalOptions::builder().max_retries(3).build().unwrap();

    let start = tokio::time::Instant::now();
    let result = processor(services, options).run(IMAGE_URL).await;
    let elapsed = start.elapsed();

    // 1000 ms before attempt 2, 2000 ms before attempt 3
    assert_eq!(result.attempts, 3);
    assert!(elapsed >= Duration::from_millis(3000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3100), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let inpainter = MockInpainter::succeeding("lama", CLEAN_URL).failing_first(1);
    let calls = inpainter.call_counter();
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainter(Arc::new(inpainter))
    .build()
    .unwrap();

    let result = processor(services, PersonRemovalOptions::default())
        .run(IMAGE_URL)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.result_url.as_deref(), Some(CLEAN_URL));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_preferred_model_is_tried_first() {
    let lama = MockInpainter::succeeding("lama", "https://cdn.example.com/lama.png");
    let sdxl = MockInpainter::succeeding("sdxl", "https://cdn.example.com/sdxl.png");
    let lama_calls = lama.call_counter();

    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainters(InpainterRegistry::new().with(Arc::new(lama)).with(Arc::new(sdxl)))
    .build()
    .unwrap();

    let options = PersonRemovalOptions::builder()
        .preferred_inpainting_model("sdxl")
        .build()
        .unwrap();
    let result = processor(services, options).run(IMAGE_URL).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.details.inpainting_model, "sdxl");
    assert_eq!(result.result_url.as_deref(), Some("https://cdn.example.com/sdxl.png"));
    assert_eq!(lama_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_custom_prompt_reaches_inpainter() {
    let inpainter = MockInpainter::succeeding("lama", CLEAN_URL);
    let prompts = inpainter.prompt_history();
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainter(Arc::new(inpainter))
    .build()
    .unwrap();

    let options = PersonRemovalOptions::builder()
        .custom_prompt("an empty sandy beach")
        .build()
        .unwrap();
    let result = processor(services, options).run(IMAGE_URL).await;
    assert!(result.success, "{:?}", result.error);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("an empty sandy beach"), "{}", prompts[0]);
    assert!(prompts[0].contains("photorealistic"));
}

#[tokio::test]
async fn test_keeping_everyone_skips_inpainting() {
    let inpainter = MockInpainter::succeeding("lama", CLEAN_URL);
    let calls = inpainter.call_counter();
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainter(Arc::new(inpainter))
    .build()
    .unwrap();

    let options = PersonRemovalOptions::builder()
        .target_foreground_count(5)
        .build()
        .unwrap();
    let result = processor(services, options).run(IMAGE_URL).await;

    assert!(result.success);
    assert_eq!(result.result_url.as_deref(), Some(IMAGE_URL));
    assert_eq!(result.details.foreground_people, 2);
    assert_eq!(result.details.background_people, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_result_serializes_with_camel_case_fields() {
    let services = PipelineServices::builder(Arc::new(MockSegmenter::with_people(
        1000,
        1000,
        &[large_centered_subject(), corner_bystander()],
    )))
    .inpainter(Arc::new(MockInpainter::succeeding("lama", CLEAN_URL)))
    .build()
    .unwrap();

    let result = processor(services, PersonRemovalOptions::default())
        .run(IMAGE_URL)
        .await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["resultUrl"], CLEAN_URL);
    assert_eq!(json["details"]["peopleDetected"], 2);
    assert_eq!(json["details"]["inpaintingModel"], "lama");
    assert!(json.get("error").is_none());
    assert!(json["processingTime"].is_u64());
}

//! Core types for person removal operations

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in image pixel space, `(x, y)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Placeholder box substituted when a capability omits the box entirely
    #[must_use]
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Build from corner coordinates `[x1, y1, x2, y2]`
    #[must_use]
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs())
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Grow the box by `margin` on every side and clip it to the image
    #[must_use]
    pub fn dilated(&self, margin: f64, image_width: u32, image_height: u32) -> Self {
        let x1 = (self.x - margin).max(0.0);
        let y1 = (self.y - margin).max(0.0);
        let x2 = (self.right() + margin).min(f64::from(image_width));
        let y2 = (self.bottom() + margin).min(f64::from(image_height));
        Self::new(x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0))
    }

    /// Smallest box containing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Whether the box lies within `[0, width] x [0, height]`
    #[must_use]
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= f64::from(image_width)
            && self.bottom() <= f64::from(image_height)
    }
}

/// Point in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Opaque region reference; the encoding is owned by the detection back-end
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskRef(String);

impl MaskRef {
    #[must_use]
    pub fn new<S: Into<String>>(reference: S) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One detected person instance
///
/// `center_point` defaults to the box center and `area` to the box area; the
/// true segmented pixel area is not required by scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMask {
    pub id: String,
    pub mask: MaskRef,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub center_point: Point,
    pub area: f64,
}

impl PersonMask {
    /// Create a person mask deriving center and area from the box
    #[must_use]
    pub fn new<S: Into<String>>(id: S, mask: MaskRef, bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            id: id.into(),
            mask,
            center_point: bbox.center(),
            area: bbox.area(),
            bbox,
            confidence,
        }
    }

    /// Override the declared center point (e.g. a mask centroid reported by the back-end)
    #[must_use]
    pub fn with_center_point(mut self, center: Point) -> Self {
        self.center_point = center;
        self
    }
}

/// Which detection path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    /// Single promptable segmentation call
    PrimarySegmentation,
    /// Bounding-box person detector followed by per-box refinement
    BoxDetectorRefiner,
}

impl DetectionSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimarySegmentation => "primary-segmentation",
            Self::BoxDetectorRefiner => "box-detector+refiner",
        }
    }
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All person masks found in one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub masks: Vec<PersonMask>,
    pub image_width: u32,
    pub image_height: u32,
    pub source: DetectionSource,
}

impl DetectionResult {
    #[must_use]
    pub fn new(
        masks: Vec<PersonMask>,
        image_width: u32,
        image_height: u32,
        source: DetectionSource,
    ) -> Self {
        Self {
            masks,
            image_width,
            image_height,
            source,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }
}

/// Per-factor sub-scores, each in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub position: f64,
    pub size: f64,
    pub clarity: f64,
    pub centrality: f64,
    pub orientation: f64,
}

/// Desirability of a person as the intended subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundScore {
    pub person_id: String,
    pub score: f64,
    pub factors: ScoreFactors,
}

/// Wall-clock time spent per stage of the final attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub detection_ms: u64,
    pub separation_ms: u64,
    pub mask_generation_ms: u64,
    pub inpainting_ms: u64,
    pub validation_ms: u64,
    /// Total end-to-end time including retries and backoff
    pub total_ms: u64,
}

/// Per-stage counts and model names reported with every result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalDetails {
    pub people_detected: usize,
    pub foreground_people: usize,
    pub background_people: usize,
    pub model_used: String,
    pub inpainting_model: String,
}

/// Terminal output of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRemovalResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Milliseconds from invocation to result
    pub processing_time: u64,
    pub details: RemovalDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Number of pipeline attempts made
    pub attempts: u32,
    pub timings: StageTimings,
    pub completed_at: DateTime<Utc>,
}

impl PersonRemovalResult {
    /// Successful result pointing at `result_url`
    #[must_use]
    pub fn succeeded(
        result_url: String,
        details: RemovalDetails,
        attempts: u32,
        timings: StageTimings,
    ) -> Self {
        Self {
            success: true,
            result_url: Some(result_url),
            processing_time: timings.total_ms,
            details,
            error: None,
            error_kind: None,
            attempts,
            timings,
            completed_at: Utc::now(),
        }
    }

    /// Failed result carrying a human-readable error
    #[must_use]
    pub fn failed(
        error: &crate::error::PersonRemovalError,
        details: RemovalDetails,
        attempts: u32,
        timings: StageTimings,
    ) -> Self {
        Self {
            success: false,
            result_url: None,
            processing_time: timings.total_ms,
            details,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            attempts,
            timings,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersonRemovalError;

    #[test]
    fn test_person_mask_derives_center_and_area() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let person = PersonMask::new("person_0", MaskRef::new("rle:abc"), bbox, 0.9);

        assert_eq!(person.center_point, Point::new(25.0, 40.0));
        assert!((person.area - 1200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bounding_box_dilation_clips_to_image() {
        let bbox = BoundingBox::new(2.0, 2.0, 10.0, 10.0);
        let dilated = bbox.dilated(5.0, 14, 100);

        assert_eq!(dilated.x, 0.0);
        assert_eq!(dilated.y, 0.0);
        assert_eq!(dilated.width, 14.0);
        assert_eq!(dilated.height, 17.0);
        assert!(dilated.fits_within(14, 100));
    }

    #[test]
    fn test_bounding_box_from_corners_normalizes_order() {
        let bbox = BoundingBox::from_corners(50.0, 60.0, 10.0, 20.0);
        assert_eq!(bbox, BoundingBox::new(10.0, 20.0, 40.0, 40.0));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let details = RemovalDetails {
            people_detected: 2,
            foreground_people: 1,
            background_people: 1,
            model_used: DetectionSource::PrimarySegmentation.to_string(),
            inpainting_model: "lama".to_string(),
        };
        let result = PersonRemovalResult::succeeded(
            "https://cdn.example.com/out.png".to_string(),
            details,
            1,
            StageTimings::default(),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["resultUrl"], "https://cdn.example.com/out.png");
        assert_eq!(json["details"]["peopleDetected"], 2);
        assert_eq!(json["details"]["modelUsed"], "primary-segmentation");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_result_carries_kind() {
        let err = PersonRemovalError::inpainting("all back-ends failed");
        let result = PersonRemovalResult::failed(
            &err,
            RemovalDetails::default(),
            2,
            StageTimings::default(),
        );

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Inpainting));
        assert!(result.error.unwrap().contains("all back-ends failed"));
    }
}

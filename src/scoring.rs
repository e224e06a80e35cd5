//! Foreground desirability scoring
//!
//! Each detected person gets a 0-100 score from five geometric factors. The
//! engine is a pure function of the person and the image dimensions.

use crate::types::{ForegroundScore, PersonMask, Point, ScoreFactors};

/// Relative weight of each factor in the final score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub position: f64,
    pub size: f64,
    pub centrality: f64,
    pub orientation: f64,
    pub clarity: f64,
}

impl ScoreWeights {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.position + self.size + self.centrality + self.orientation + self.clarity
    }
}

/// Weights used by [`score`]; they sum to exactly 1.0
pub const WEIGHTS: ScoreWeights = ScoreWeights {
    position: 0.30,
    size: 0.25,
    centrality: 0.20,
    orientation: 0.15,
    clarity: 0.10,
};

// Area ratio band considered an ideal subject size
const IDEAL_SIZE_MIN: f64 = 0.05;
const IDEAL_SIZE_MAX: f64 = 0.40;

/// Score one person against the image frame
#[must_use]
pub fn score(person: &PersonMask, image_width: u32, image_height: u32) -> ForegroundScore {
    let frame = Frame::new(image_width, image_height);

    let factors = ScoreFactors {
        position: position_score(&frame, &person.bbox.center()),
        size: size_score(&frame, person.area),
        clarity: clarity_score(person.confidence),
        centrality: centrality_score(&frame, &person.center_point),
        orientation: orientation_score(&frame, &person.center_point),
    };

    let weighted = factors.position * WEIGHTS.position
        + factors.size * WEIGHTS.size
        + factors.centrality * WEIGHTS.centrality
        + factors.orientation * WEIGHTS.orientation
        + factors.clarity * WEIGHTS.clarity;

    ForegroundScore {
        person_id: person.id.clone(),
        score: clamp_score(weighted),
        factors,
    }
}

struct Frame {
    width: f64,
    height: f64,
    center: Point,
    /// Distance from the center to a corner
    max_distance: f64,
}

impl Frame {
    fn new(width: u32, height: u32) -> Self {
        let width = f64::from(width);
        let height = f64::from(height);
        Self {
            width,
            height,
            center: Point::new(width / 2.0, height / 2.0),
            max_distance: (width / 2.0).hypot(height / 2.0),
        }
    }

    fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Distance to the image center as a fraction of the half-diagonal
    ///
    /// A degenerate frame counts as maximally off-center.
    fn normalized_distance(&self, point: &Point) -> f64 {
        if self.max_distance <= 0.0 {
            return 1.0;
        }
        let ratio = point.distance_to(&self.center) / self.max_distance;
        if ratio.is_finite() {
            ratio
        } else {
            1.0
        }
    }
}

fn position_score(frame: &Frame, bbox_center: &Point) -> f64 {
    let d = frame.normalized_distance(bbox_center);
    clamp_score(100.0 * (-3.0 * d).exp())
}

fn size_score(frame: &Frame, person_area: f64) -> f64 {
    let image_area = frame.area();
    if image_area <= 0.0 || !person_area.is_finite() {
        return 0.0;
    }
    let ratio = (person_area / image_area).max(0.0);

    let value = if ratio < IDEAL_SIZE_MIN {
        (ratio / IDEAL_SIZE_MIN) * 60.0
    } else if ratio <= IDEAL_SIZE_MAX {
        100.0
    } else {
        let over = (ratio - IDEAL_SIZE_MAX) / IDEAL_SIZE_MAX;
        (100.0 * (1.0 - over)).max(20.0)
    };
    clamp_score(value)
}

fn centrality_score(frame: &Frame, center_point: &Point) -> f64 {
    let d = frame.normalized_distance(center_point);
    clamp_score(100.0 * (-2.0 * d * d).exp())
}

fn orientation_score(frame: &Frame, center_point: &Point) -> f64 {
    let mut value = 50.0;
    // Subjects tend to stand in the lower part of the frame
    if center_point.y > 0.30 * frame.height {
        value += 30.0;
    }
    if center_point.x > 0.20 * frame.width && center_point.x < 0.80 * frame.width {
        value += 20.0;
    }
    clamp_score(value)
}

fn clarity_score(confidence: f64) -> f64 {
    clamp_score((70.0 + confidence * 30.0).min(100.0))
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, MaskRef};

    const W: u32 = 1000;
    const H: u32 = 800;

    fn person(id: &str, bbox: BoundingBox, confidence: f64) -> PersonMask {
        PersonMask::new(id, MaskRef::new(format!("mask://{id}")), bbox, confidence)
    }

    /// Box of the given area fraction centered on `(cx, cy)`
    fn box_at(cx: f64, cy: f64, area_fraction: f64) -> BoundingBox {
        let side_ratio = area_fraction.sqrt();
        let w = f64::from(W) * side_ratio;
        let h = f64::from(H) * side_ratio;
        BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((WEIGHTS.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_centered_subject_scores_near_maximum() {
        let p = person("a", box_at(500.0, 400.0, 0.20), 1.0);
        let s = score(&p, W, H);

        assert!((s.factors.position - 100.0).abs() < 1e-9);
        assert!((s.factors.size - 100.0).abs() < 1e-9);
        assert!((s.factors.centrality - 100.0).abs() < 1e-9);
        assert!((s.factors.orientation - 100.0).abs() < 1e-9);
        assert!((s.factors.clarity - 100.0).abs() < 1e-9);
        assert!((s.score - 100.0).abs() < 1e-9);
        assert_eq!(s.person_id, "a");
    }

    #[test]
    fn test_size_factor_piecewise() {
        let frame = Frame::new(100, 100);
        // 2.5% of the frame: half of the small-subject ramp
        assert!((size_score(&frame, 250.0) - 30.0).abs() < 1e-9);
        assert!((size_score(&frame, 500.0) - 100.0).abs() < 1e-9);
        assert!((size_score(&frame, 4000.0) - 100.0).abs() < 1e-9);
        // 60% of the frame: 100 * (1 - 0.5)
        assert!((size_score(&frame, 6000.0) - 50.0).abs() < 1e-9);
        // Oversized subjects bottom out at 20
        assert!((size_score(&frame, 10_000.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_orientation_bonuses() {
        let frame = Frame::new(100, 100);
        assert_eq!(orientation_score(&frame, &Point::new(5.0, 5.0)), 50.0);
        assert_eq!(orientation_score(&frame, &Point::new(5.0, 50.0)), 80.0);
        assert_eq!(orientation_score(&frame, &Point::new(50.0, 5.0)), 70.0);
        assert_eq!(orientation_score(&frame, &Point::new(50.0, 50.0)), 100.0);
        // Boundaries are exclusive
        assert_eq!(orientation_score(&frame, &Point::new(20.0, 30.0)), 50.0);
    }

    #[test]
    fn test_position_decays_towards_corner() {
        let frame = Frame::new(100, 100);
        let corner = position_score(&frame, &Point::new(0.0, 0.0));
        assert!((corner - 100.0 * (-3.0f64).exp()).abs() < 1e-9);
        let centrality = centrality_score(&frame, &Point::new(100.0, 100.0));
        assert!((centrality - 100.0 * (-2.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_centrality_uses_declared_center() {
        let bbox = box_at(500.0, 400.0, 0.10);
        let declared = person("a", bbox, 0.9);
        let shifted = person("b", bbox, 0.9).with_center_point(Point::new(0.0, 0.0));

        let a = score(&declared, W, H);
        let b = score(&shifted, W, H);
        assert_eq!(a.factors.position, b.factors.position);
        assert!(b.factors.centrality < a.factors.centrality);
    }

    #[test]
    fn test_scores_bounded_for_extreme_inputs() {
        let cases = [
            person("neg", BoundingBox::new(-500.0, -500.0, 10.0, 10.0), -3.0),
            person("huge", BoundingBox::new(0.0, 0.0, 1e9, 1e9), 7.0),
            person("zero", BoundingBox::new(0.0, 0.0, 0.0, 0.0), 0.0),
            person("nan", BoundingBox::new(f64::NAN, 1.0, 1.0, 1.0), f64::NAN),
        ];
        for (w, h) in [(W, H), (0, 0), (1, 1)] {
            for p in &cases {
                let s = score(p, w, h);
                for value in [
                    s.score,
                    s.factors.position,
                    s.factors.size,
                    s.factors.clarity,
                    s.factors.centrality,
                    s.factors.orientation,
                ] {
                    assert!((0.0..=100.0).contains(&value), "{} out of range for {}", value, p.id);
                }
            }
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let p = person("a", BoundingBox::new(123.4, 56.7, 89.0, 210.5), 0.73);
        let first = score(&p, W, H);
        let second = score(&p, W, H);
        assert_eq!(first.score.to_bits(), second.score.to_bits());
        assert_eq!(first, second);
    }
}

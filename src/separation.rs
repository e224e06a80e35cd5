//! Foreground/background separation
//!
//! Ranks every detection with [`crate::scoring::score`], keeps the top
//! `target_foreground_count` as foreground and marks the rest for removal.
//! Ties keep detection order (stable sort), so earlier detections win.

use crate::{
    mask::{combine_masks, MaskUnion},
    scoring,
    types::{DetectionResult, ForegroundScore, PersonMask},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Partition of one detection result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationResult {
    /// People to keep, in detection order
    pub foreground_masks: Vec<PersonMask>,
    /// People to remove, in detection order
    pub background_masks: Vec<PersonMask>,
    pub foreground_mask: MaskUnion,
    pub background_mask: MaskUnion,
    /// Scores of every detection, best first
    pub ranking: Vec<ForegroundScore>,
}

impl SeparationResult {
    #[must_use]
    pub fn needs_removal(&self) -> bool {
        !self.background_masks.is_empty()
    }
}

/// Score and rank detections, best first
#[must_use]
pub fn rank(detection: &DetectionResult) -> Vec<ForegroundScore> {
    let mut ranking: Vec<ForegroundScore> = detection
        .masks
        .iter()
        .map(|person| scoring::score(person, detection.image_width, detection.image_height))
        .collect();
    ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranking
}

/// Split detections into foreground and background
#[must_use]
pub fn separate(detection: &DetectionResult, target_foreground_count: usize) -> SeparationResult {
    if detection.masks.is_empty() {
        return SeparationResult::default();
    }

    let ranking = rank(detection);
    let keep = target_foreground_count.min(ranking.len());
    let foreground_ids: HashSet<&str> = ranking
        .iter()
        .take(keep)
        .map(|s| s.person_id.as_str())
        .collect();

    let (foreground_masks, background_masks): (Vec<PersonMask>, Vec<PersonMask>) = detection
        .masks
        .iter()
        .cloned()
        .partition(|person| foreground_ids.contains(person.id.as_str()));

    tracing::debug!(
        detected = detection.masks.len(),
        foreground = foreground_masks.len(),
        background = background_masks.len(),
        top_score = ranking.first().map_or(0.0, |s| s.score),
        "Separated foreground from background"
    );

    SeparationResult {
        foreground_mask: combine_masks(&foreground_masks),
        background_mask: combine_masks(&background_masks),
        foreground_masks,
        background_masks,
        ranking,
    }
}

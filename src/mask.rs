//! Region union and fill-mask generation
//!
//! Person masks are opaque references owned by the detection back-end, so a
//! partition is represented as the set of its member regions rather than a
//! single merged bitmap. A box-derived raster can be rendered on demand for
//! back-ends that want an uploaded mask image.

use crate::{
    error::{PersonRemovalError, Result},
    types::{BoundingBox, MaskRef, PersonMask},
};
use image::{GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;

/// One person's contribution to a merged mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRegion {
    pub person_id: String,
    pub mask: MaskRef,
    pub bbox: BoundingBox,
}

impl From<&PersonMask> for PersonRegion {
    fn from(person: &PersonMask) -> Self {
        Self {
            person_id: person.id.clone(),
            mask: person.mask.clone(),
            bbox: person.bbox,
        }
    }
}

/// Union of person regions keyed by person id
///
/// Person ids are unique within one detection result, which makes `union`
/// commutative, associative and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskUnion {
    regions: BTreeMap<String, PersonRegion>,
}

impl MaskUnion {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_person(person: &PersonMask) -> Self {
        let mut union = Self::empty();
        union.insert(PersonRegion::from(person));
        union
    }

    pub fn insert(&mut self, region: PersonRegion) {
        self.regions.insert(region.person_id.clone(), region);
    }

    /// Union of `self` and `other`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for region in other.regions.values() {
            merged
                .regions
                .entry(region.person_id.clone())
                .or_insert_with(|| region.clone());
        }
        merged
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn contains(&self, person_id: &str) -> bool {
        self.regions.contains_key(person_id)
    }

    /// Member regions ordered by person id
    pub fn regions(&self) -> impl Iterator<Item = &PersonRegion> {
        self.regions.values()
    }

    #[must_use]
    pub fn mask_refs(&self) -> Vec<&MaskRef> {
        self.regions.values().map(|r| &r.mask).collect()
    }

    /// Smallest box covering every member region
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.regions
            .values()
            .map(|r| r.bbox)
            .reduce(|acc, bbox| acc.union(&bbox))
    }
}

impl<'a> FromIterator<&'a PersonMask> for MaskUnion {
    fn from_iter<I: IntoIterator<Item = &'a PersonMask>>(iter: I) -> Self {
        let mut union = Self::empty();
        for person in iter {
            union.insert(PersonRegion::from(person));
        }
        union
    }
}

/// Merge a partition into one mask; empty input yields an empty union
#[must_use]
pub fn combine_masks(masks: &[PersonMask]) -> MaskUnion {
    masks.iter().collect()
}

/// Fill region handed to the inpainting back-ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InpaintingMask {
    pub regions: MaskUnion,
    pub image_width: u32,
    pub image_height: u32,
    /// Margin added around every region to avoid seams
    pub dilation_px: u32,
}

impl InpaintingMask {
    /// Dilated boxes of every region, clipped to the image
    #[must_use]
    pub fn fill_boxes(&self) -> Vec<BoundingBox> {
        self.regions
            .regions()
            .map(|r| {
                r.bbox
                    .dilated(f64::from(self.dilation_px), self.image_width, self.image_height)
            })
            .filter(|bbox| bbox.area() > 0.0)
            .collect()
    }

    /// Box-derived binary raster, 255 inside the fill region
    #[must_use]
    pub fn render(&self) -> GrayImage {
        let mut raster = GrayImage::new(self.image_width, self.image_height);
        for bbox in self.fill_boxes() {
            let x1 = bbox.x.floor().max(0.0) as u32;
            let y1 = bbox.y.floor().max(0.0) as u32;
            let x2 = (bbox.right().ceil() as u32).min(self.image_width);
            let y2 = (bbox.bottom().ceil() as u32).min(self.image_height);
            for y in y1..y2 {
                for x in x1..x2 {
                    raster.put_pixel(x, y, Luma([255]));
                }
            }
        }
        raster
    }

    /// Fraction of the image covered by the fill region
    #[must_use]
    pub fn coverage(&self) -> f64 {
        let total = u64::from(self.image_width) * u64::from(self.image_height);
        if total == 0 {
            return 0.0;
        }
        let filled = self.render().pixels().filter(|p| p.0[0] > 0).count();
        filled as f64 / total as f64
    }

    /// Encode the rendered raster as PNG
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.render()
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| {
                PersonRemovalError::mask_generation(format!("PNG encoding failed: {}", e))
            })?;
        Ok(buffer.into_inner())
    }
}

/// Builds the fill mask from the background partition
#[derive(Debug, Clone, Copy)]
pub struct MaskGenerator {
    dilation_px: u32,
}

impl MaskGenerator {
    #[must_use]
    pub fn new(dilation_px: u32) -> Self {
        Self { dilation_px }
    }

    /// Fill mask for `background`, `Ok(None)` when there is nothing to remove
    ///
    /// # Errors
    /// - Zero image dimensions
    /// - No background region overlaps the image
    pub fn generate(
        &self,
        background: &[PersonMask],
        image_width: u32,
        image_height: u32,
    ) -> Result<Option<InpaintingMask>> {
        if background.is_empty() {
            return Ok(None);
        }

        if image_width == 0 || image_height == 0 {
            return Err(PersonRemovalError::mask_generation(format!(
                "Invalid image dimensions {}x{}",
                image_width, image_height
            )));
        }

        let mask = InpaintingMask {
            regions: combine_masks(background),
            image_width,
            image_height,
            dilation_px: self.dilation_px,
        };

        if mask.fill_boxes().is_empty() {
            return Err(PersonRemovalError::mask_generation(format!(
                "None of the {} background regions overlap the {}x{} image",
                background.len(),
                image_width,
                image_height
            )));
        }

        tracing::debug!(
            regions = mask.regions.len(),
            dilation_px = self.dilation_px,
            "Generated inpainting mask"
        );
        Ok(Some(mask))
    }
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Fill mask for `background` using the default dilation
///
/// # Errors
/// See [`MaskGenerator::generate`].
pub fn generate_mask(
    background: &[PersonMask],
    image_width: u32,
    image_height: u32,
) -> Result<Option<InpaintingMask>> {
    MaskGenerator::default().generate(background, image_width, image_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, x: f64, y: f64, w: f64, h: f64) -> PersonMask {
        PersonMask::new(id, MaskRef::new(format!("mask://{id}")), BoundingBox::new(x, y, w, h), 0.9)
    }

    fn people() -> Vec<PersonMask> {
        vec![
            person("person_0", 0.0, 0.0, 10.0, 10.0),
            person("person_1", 20.0, 20.0, 10.0, 10.0),
            person("person_2", 40.0, 5.0, 5.0, 30.0),
        ]
    }

    #[test]
    fn test_combine_empty_is_empty() {
        assert!(combine_masks(&[]).is_empty());
        assert!(combine_masks(&[]).bounding_box().is_none());
    }

    #[test]
    fn test_combine_single_is_identity() {
        let p = people();
        let single = combine_masks(&p[..1]);
        assert_eq!(single, MaskUnion::from_person(&p[0]));
        assert_eq!(single.mask_refs(), vec![&p[0].mask]);
    }

    #[test]
    fn test_union_includes_every_member() {
        let p = people();
        let merged = combine_masks(&p);
        assert_eq!(merged.len(), 3);
        assert!(p.iter().all(|m| merged.contains(&m.id)));
        assert_eq!(merged.bounding_box(), Some(BoundingBox::new(0.0, 0.0, 45.0, 35.0)));
    }

    #[test]
    fn test_union_algebra() {
        let p = people();
        let a = MaskUnion::from_person(&p[0]);
        let b = MaskUnion::from_person(&p[1]);
        let c = MaskUnion::from_person(&p[2]);

        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(a.union(&a), a);
        assert_eq!(a.union(&MaskUnion::empty()), a);
        assert_eq!(MaskUnion::empty().union(&a), a);
    }

    #[test]
    fn test_generate_empty_background() {
        assert!(generate_mask(&[], 100, 100).unwrap().is_none());
    }

    #[test]
    fn test_generate_rejects_degenerate_inputs() {
        let p = people();
        assert!(generate_mask(&p, 0, 100).is_err());

        let outside = vec![person("person_9", 500.0, 500.0, 10.0, 10.0)];
        let err = MaskGenerator::new(0).generate(&outside, 100, 100).unwrap_err();
        assert!(matches!(err, PersonRemovalError::MaskGeneration(_)));
    }

    #[test]
    fn test_render_applies_dilation() {
        let background = vec![person("person_1", 20.0, 20.0, 10.0, 10.0)];
        let mask = MaskGenerator::new(2).generate(&background, 50, 50).unwrap().unwrap();
        let raster = mask.render();

        assert_eq!(raster.dimensions(), (50, 50));
        assert_eq!(raster.get_pixel(18, 18).0[0], 255);
        assert_eq!(raster.get_pixel(31, 31).0[0], 255);
        assert_eq!(raster.get_pixel(17, 17).0[0], 0);
        assert_eq!(raster.get_pixel(32, 25).0[0], 0);
        assert!((mask.coverage() - 196.0 / 2500.0).abs() < 1e-12);
    }

    #[test]
    fn test_png_encoding_round_trips_dimensions() {
        let mask = generate_mask(&people(), 64, 48).unwrap().unwrap();
        let bytes = mask.to_png_bytes().unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}

use std::collections::HashMap;

use image::{imageops, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use super::MaskProcessor;

/// Threshold, morphological smoothing and largest-component filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphologyMaskProcessor {
    /// Fixed binarization level; Otsu's level when `None`
    pub threshold: Option<u8>,
    /// Radius of the closing and opening applied by `smooth`, 0 disables it
    pub smoothing_radius: u8,
    /// Number of connected regions kept by `remove_artifacts`
    pub max_components: usize,
}

impl Default for MorphologyMaskProcessor {
    fn default() -> Self {
        MorphologyMaskProcessor {
            threshold: None,
            smoothing_radius: 5,
            // two lungs
            max_components: 2,
        }
    }
}

impl MaskProcessor for MorphologyMaskProcessor {
    fn binarize(&self, img: &GrayImage) -> anyhow::Result<GrayImage> {
        let level = self.threshold.unwrap_or_else(|| otsu_level(img));
        debug!("Binarizing map at level {}", level);
        let mut mask = img.clone();
        mask.pixels_mut()
            .for_each(|p| *p = if p[0] > level { Luma([255]) } else { Luma([0]) });
        Ok(mask)
    }

    fn smooth(&self, mask: &GrayImage) -> anyhow::Result<GrayImage> {
        if self.smoothing_radius == 0 {
            return Ok(mask.clone());
        }
        // erosion counts pixels outside the image as foreground, so the mask gets a
        // background border wide enough that closing cannot reach past it
        let pad = 2 * self.smoothing_radius as u32 + 1;
        let (width, height) = mask.dimensions();
        let mut padded = GrayImage::new(width + 2 * pad, height + 2 * pad);
        imageops::replace(&mut padded, mask, pad as i64, pad as i64);
        let closed = close(&padded, Norm::LInf, self.smoothing_radius);
        let opened = open(&closed, Norm::LInf, self.smoothing_radius);
        Ok(imageops::crop_imm(&opened, pad, pad, width, height).to_image())
    }

    fn remove_artifacts(&self, mask: &GrayImage) -> anyhow::Result<GrayImage> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
        let mut areas: HashMap<u32, usize> = HashMap::new();
        for label in labels.pixels().map(|p| p[0]).filter(|l| *l != 0) {
            *areas.entry(label).or_insert(0) += 1;
        }
        let mut by_area: Vec<(u32, usize)> = areas.into_iter().collect();
        by_area.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let kept: Vec<u32> = by_area
            .iter()
            .take(self.max_components)
            .map(|(label, _)| *label)
            .collect();
        debug!(
            "Keeping {} of {} connected regions",
            kept.len(),
            by_area.len()
        );

        let (width, height) = mask.dimensions();
        Ok(GrayImage::from_fn(width, height, |x, y| {
            if kept.contains(&labels.get_pixel(x, y)[0]) {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }
}

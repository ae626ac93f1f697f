//! Contracts of the models the pipeline chains together.
//!
//! Segmenters, detectors and the classifier are trained elsewhere; the pipeline only
//! needs them to turn an image (or a table) into the next stage's input.

use std::path::Path;

use anyhow::anyhow;
use image::{GrayImage, RgbImage};

use crate::features::feature_name;

pub mod detection;
pub mod map_fuser;
pub mod mask_processor;
pub mod non_max_suppressor;

pub use detection::{Detection, RawDetection};
pub use map_fuser::{MapFuser, MapScale, ProbMap};
pub use mask_processor::MorphologyMaskProcessor;
pub use non_max_suppressor::IouSuppressor;

/// Predicts a lung probability map for an X-ray.
pub trait LungSegmenter {
    fn model_name(&self) -> &str;

    /// Probability map at the model's own resolution, in `[0, 255]` when
    /// `scale_output` is set and in `[0, 1]` otherwise.
    fn predict(&self, img: &RgbImage, scale_output: bool) -> anyhow::Result<ProbMap>;
}

/// Detects radiographic features in a lung crop.
pub trait FeatureDetector {
    fn model_name(&self) -> &str;

    fn predict(&self, img: &RgbImage) -> anyhow::Result<Vec<RawDetection>>;

    /// Turns raw detections into table rows referencing `img_path`.
    fn process_detections(
        &self,
        img_path: &Path,
        detections: Vec<RawDetection>,
    ) -> anyhow::Result<Vec<Detection>> {
        detections
            .into_iter()
            .map(|det| {
                let feature = feature_name(det.feature_id)
                    .ok_or_else(|| anyhow!("unknown feature id {}", det.feature_id))?;
                Ok(Detection::new(
                    img_path.to_string_lossy().into_owned(),
                    self.model_name().to_string(),
                    det.feature_id,
                    feature.to_string(),
                    det.bbox,
                    det.confidence,
                ))
            })
            .collect()
    }
}

/// Removes duplicate detections.
pub trait NonMaxSuppressor {
    fn suppress(&self, detections: Vec<Detection>) -> anyhow::Result<Vec<Detection>>;
}

/// Assigns an edema class to the detections of one image.
pub trait EdemaClassifier {
    fn classify(&self, detections: Vec<Detection>) -> anyhow::Result<Vec<Detection>>;
}

/// Turns a fused probability map into a clean binary lung mask.
pub trait MaskProcessor {
    fn binarize(&self, img: &GrayImage) -> anyhow::Result<GrayImage>;
    fn smooth(&self, mask: &GrayImage) -> anyhow::Result<GrayImage>;
    fn remove_artifacts(&self, mask: &GrayImage) -> anyhow::Result<GrayImage>;
}

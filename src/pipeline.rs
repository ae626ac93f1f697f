//! End to end inference on chest X-rays: lung segmentation, lung crop, feature
//! detection and edema classification.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{Luma, Rgb};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{EdemaError, Result};
use crate::geometry::{compute_lungs_metadata, modify_lung_box, process_image};
use crate::models::{
    Detection, EdemaClassifier, FeatureDetector, LungSegmenter, MapFuser, MaskProcessor,
    NonMaxSuppressor,
};

mod artifacts;

pub use artifacts::ArtifactPaths;

fn model_error(stage: &'static str, model: &str) -> impl FnOnce(anyhow::Error) -> EdemaError {
    let model = model.to_string();
    move |source| EdemaError::Model {
        stage,
        model,
        source,
    }
}

fn stage_error(stage: &'static str) -> impl FnOnce(anyhow::Error) -> EdemaError {
    move |source| EdemaError::Stage { stage, source }
}

pub struct EdemaNet {
    lung_segmenters: Vec<Box<dyn LungSegmenter>>,
    feature_detectors: Vec<Box<dyn FeatureDetector>>,
    mask_processor: Box<dyn MaskProcessor>,
    non_max_suppressor: Box<dyn NonMaxSuppressor>,
    edema_classifier: Box<dyn EdemaClassifier>,
    config: PipelineConfig,
}

impl EdemaNet {
    pub fn new(
        lung_segmenters: Vec<Box<dyn LungSegmenter>>,
        feature_detectors: Vec<Box<dyn FeatureDetector>>,
        mask_processor: Box<dyn MaskProcessor>,
        non_max_suppressor: Box<dyn NonMaxSuppressor>,
        edema_classifier: Box<dyn EdemaClassifier>,
        config: PipelineConfig,
    ) -> EdemaNet {
        EdemaNet {
            lung_segmenters,
            feature_detectors,
            mask_processor,
            non_max_suppressor,
            edema_classifier,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the whole pipeline on one image, writing every intermediate artifact
    /// to `<save_dir>/<image stem>/`, and returns the classified detections.
    pub fn predict<T: AsRef<Path>, U: AsRef<Path>>(
        &self,
        img_path: T,
        save_dir: U,
    ) -> Result<Vec<Detection>> {
        let img_path = img_path.as_ref();
        info!("Processing {}", img_path.display());
        let paths = ArtifactPaths::new(img_path, save_dir.as_ref());
        fs::create_dir_all(&paths.dir)?;

        let img = image::open(img_path)?.to_rgb8();
        img.save(&paths.source)?;
        let (img_width, img_height) = img.dimensions();

        let mut map_fuser = MapFuser::new();
        for segmenter in &self.lung_segmenters {
            let name = segmenter.model_name();
            let prob_map = segmenter
                .predict(&img, true)
                .map_err(model_error("lung segmenter", name))?
                .resize(img_width, img_height, FilterType::Lanczos3);
            prob_map.to_gray().save(paths.model_map(name))?;
            map_fuser.add_prob_map(prob_map)?;
            debug!("Added map of {}", name);
        }
        let fused_map = map_fuser.conditional_probability_fusion(true)?.to_gray();
        fused_map.save(&paths.fused_map)?;

        let mask = self
            .mask_processor
            .binarize(&fused_map)
            .and_then(|mask| self.mask_processor.smooth(&mask))
            .and_then(|mask| self.mask_processor.remove_artifacts(&mask))
            .map_err(stage_error("mask processing"))?;
        mask.save(&paths.mask)?;

        let lungs = compute_lungs_metadata(&mask)?;
        let lung_box = modify_lung_box(
            img_height,
            img_width,
            lungs.bbox,
            self.config.lung_extension,
        )
        .bbox;
        debug!("Lungs at {}, cropping {}", lungs.bbox, lung_box);

        let img_crop = process_image(
            &img,
            &lung_box,
            self.config.img_size,
            Rgb([0, 0, 0]),
            FilterType::Lanczos3,
        )?;
        img_crop.save(&paths.crop)?;
        let mask_crop = process_image(
            &mask,
            &lung_box,
            self.config.img_size,
            Luma([0]),
            FilterType::Nearest,
        )?;
        mask_crop.save(&paths.mask_crop)?;

        let mut detections = vec![];
        for detector in &self.feature_detectors {
            let name = detector.model_name();
            let raw = detector
                .predict(&img_crop)
                .map_err(model_error("feature detector", name))?;
            let rows = detector
                .process_detections(&paths.crop, raw)
                .map_err(model_error("feature detector", name))?;
            let kept = self
                .non_max_suppressor
                .suppress(rows)
                .map_err(stage_error("non-max suppression"))?;
            debug!("{} kept {} detections", name, kept.len());
            detections.extend(kept);
        }

        let detections = self
            .edema_classifier
            .classify(detections)
            .map_err(stage_error("edema classification"))?;
        write_detections(&paths.metadata, &detections)?;
        info!(
            "Found {} features in {}",
            detections.len(),
            img_path.display()
        );
        Ok(detections)
    }

    /// Runs [`EdemaNet::predict`] on every image in turn. A failing image is logged
    /// and its error returned alongside the others; it does not stop the batch.
    pub fn predict_batch<T: AsRef<Path>, U: AsRef<Path>>(
        &self,
        img_paths: &[T],
        save_dir: U,
    ) -> Vec<(PathBuf, Result<Vec<Detection>>)> {
        img_paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let result = self.predict(path, save_dir.as_ref());
                if let Err(e) = &result {
                    warn!("Failed to process {}: {}", path.display(), e);
                }
                (path.to_owned(), result)
            })
            .collect()
    }
}

fn write_detections(path: &Path, detections: &[Detection]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for detection in detections {
        writer.serialize(detection)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, LungExtension};
    use crate::models::{IouSuppressor, MorphologyMaskProcessor, ProbMap, RawDetection};
    use anyhow::bail;
    use image::{imageops, GrayImage, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    /// Treats bright pixels as lungs, at half the input resolution
    struct BrightnessSegmenter;

    impl LungSegmenter for BrightnessSegmenter {
        fn model_name(&self) -> &str {
            "brightness"
        }

        fn predict(&self, img: &RgbImage, _scale_output: bool) -> anyhow::Result<ProbMap> {
            let gray = imageops::grayscale(img);
            let half = imageops::resize(
                &gray,
                img.width() / 2,
                img.height() / 2,
                FilterType::Nearest,
            );
            Ok(ProbMap::from_gray(&half))
        }
    }

    struct FixedDetector;

    impl FeatureDetector for FixedDetector {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, _img: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
            Ok(vec![
                RawDetection {
                    feature_id: 4,
                    bbox: BoundingBox::new(2, 2, 10, 10),
                    confidence: 0.9,
                },
                RawDetection {
                    feature_id: 4,
                    bbox: BoundingBox::new(3, 3, 11, 11),
                    confidence: 0.6,
                },
                RawDetection {
                    feature_id: 6,
                    bbox: BoundingBox::new(20, 20, 30, 30),
                    confidence: 0.75,
                },
            ])
        }
    }

    struct FailingDetector;

    impl FeatureDetector for FailingDetector {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _img: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
            bail!("weights not loaded")
        }
    }

    struct ConstantClassifier;

    impl EdemaClassifier for ConstantClassifier {
        fn classify(&self, mut detections: Vec<Detection>) -> anyhow::Result<Vec<Detection>> {
            for det in &mut detections {
                det.class_id = Some(2);
                det.class_name = Some("Interstitial edema".to_string());
            }
            Ok(detections)
        }
    }

    fn net(detector: Box<dyn FeatureDetector>) -> EdemaNet {
        EdemaNet::new(
            vec![Box::new(BrightnessSegmenter)],
            vec![detector],
            Box::new(MorphologyMaskProcessor {
                threshold: Some(128),
                smoothing_radius: 1,
                max_components: 2,
            }),
            Box::new(IouSuppressor::default()),
            Box::new(ConstantClassifier),
            PipelineConfig {
                img_size: (32, 32),
                lung_extension: LungExtension::new(2, 2, 2, 2),
            },
        )
    }

    fn write_xray(path: &Path, with_lungs: bool) {
        let mut gray = GrayImage::from_pixel(64, 48, Luma([10]));
        if with_lungs {
            draw_filled_rect_mut(&mut gray, Rect::at(16, 8).of_size(32, 32), Luma([240]));
        }
        image::DynamicImage::ImageLuma8(gray)
            .to_rgb8()
            .save(path)
            .unwrap();
    }

    #[test]
    fn predict_writes_artifacts_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("xray.png");
        write_xray(&img_path, true);
        let save_dir = dir.path().join("out");

        let detections = net(Box::new(FixedDetector))
            .predict(&img_path, &save_dir)
            .unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections
            .iter()
            .all(|d| d.class_name.as_deref() == Some("Interstitial edema")));

        let paths = ArtifactPaths::new(&img_path, &save_dir);
        for path in [
            &paths.source,
            &paths.fused_map,
            &paths.mask,
            &paths.crop,
            &paths.mask_crop,
            &paths.metadata,
        ] {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(paths.model_map("brightness").exists());
        assert_eq!(
            image::open(&paths.crop).unwrap().to_rgb8().dimensions(),
            (32, 32)
        );
        assert_eq!(detections[0].img_path, paths.crop.to_string_lossy());

        let mut reader = csv::Reader::from_path(&paths.metadata).unwrap();
        let saved: Vec<Detection> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(saved, detections);
    }

    #[test]
    fn model_failure_names_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("xray.png");
        write_xray(&img_path, true);

        let result = net(Box::new(FailingDetector)).predict(&img_path, dir.path().join("out"));
        match result {
            Err(EdemaError::Model { stage, model, .. }) => {
                assert_eq!(stage, "feature detector");
                assert_eq!(model, "failing");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failed_image_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let dark = dir.path().join("dark.png");
        let bright = dir.path().join("bright.png");
        write_xray(&dark, false);
        write_xray(&bright, true);

        let results = net(Box::new(FixedDetector)).predict_batch(&[&dark, &bright], dir.path().join("out"));
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].1, Err(EdemaError::NoContours)));
        assert_eq!(results[1].0, bright);
        assert_eq!(results[1].1.as_ref().unwrap().len(), 2);
    }
}

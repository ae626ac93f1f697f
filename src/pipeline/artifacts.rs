use std::path::{Path, PathBuf};

const SRC_SUFFIX: &str = "src";
const MAP_PREFIX: &str = "map";
const MAP_NAME: &str = "map.png";
const MASK_NAME: &str = "mask.png";
const MASK_CROP_NAME: &str = "mask_crop.png";
const METADATA_NAME: &str = "metadata.csv";

/// Files written while processing one image, all inside `<save_dir>/<stem>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    /// Copy of the input image
    pub source: PathBuf,
    pub fused_map: PathBuf,
    pub mask: PathBuf,
    /// Lung crop the detectors run on, named after the input image
    pub crop: PathBuf,
    pub mask_crop: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(img_path: &Path, save_dir: &Path) -> ArtifactPaths {
        let stem = img_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = save_dir.join(&stem);
        ArtifactPaths {
            source: dir.join(format!("{}_{}.png", stem, SRC_SUFFIX)),
            fused_map: dir.join(MAP_NAME),
            mask: dir.join(MASK_NAME),
            crop: dir.join(format!("{}.png", stem)),
            mask_crop: dir.join(MASK_CROP_NAME),
            metadata: dir.join(METADATA_NAME),
            dir,
        }
    }

    /// Map predicted by a single segmenter
    pub fn model_map(&self, model_name: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.png", MAP_PREFIX, model_name))
    }
}

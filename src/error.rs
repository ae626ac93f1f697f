use thiserror::Error;

use crate::geometry::BoundingBox;

/// Errors produced while preparing data or running the pipeline on one image.
#[derive(Debug, Error)]
pub enum EdemaError {
    #[error("no contours found in the lung mask")]
    NoContours,

    #[error("neither polygon nor mask data is present for finding '{0}'")]
    MissingGeometry(String),

    #[error("invalid coordinate string '{0}'")]
    InvalidCoordinates(String),

    #[error("invalid bitmap: {0}")]
    InvalidBitmap(String),

    #[error("region {0} is empty after clipping to the image")]
    EmptyRegion(BoundingBox),

    #[error("probability map is {actual:?}, expected {expected:?}")]
    MapShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("no probability maps to fuse")]
    NoProbMaps,

    #[error("index {index} is out of range for a dataset of {len} images")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no metadata rows for image")]
    EmptyAnnotationGroup,

    #[error("image and masks differ in size: image {image:?}, mask {mask:?}")]
    SizeMismatch { image: (u32, u32), mask: (u32, u32) },

    #[error(
        "{n_split_trials} split trials were not enough to split dataset. \
         Consider increasing n_split_trials or set ensure_all_classes_in_splits to false"
    )]
    SplitTrialsExhausted { n_split_trials: usize },

    #[error("{stage} '{model}' failed: {source}")]
    Model {
        stage: &'static str,
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EdemaError>;

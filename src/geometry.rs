//! Pure geometry used between the models: lung box extraction, box extension and
//! clipping, and the crop/resize/pad transforms that normalize image regions.

pub mod bbox;
pub mod lungs;
pub mod transform;

pub use bbox::{modify_lung_box, BoundingBox, BoxViolation, LungExtension, ModifiedLungBox};
pub use lungs::{compute_lungs_metadata, LungsMetadata};
pub use transform::{fit_within, pad_center, process_image, resize_and_pad, Raster, ResizeRule};

//! Pulmonary edema assessment on chest X-rays.
//!
//! [`pipeline::EdemaNet`] chains lung segmentation, probability map fusion, lung
//! cropping, feature detection and edema classification. The [`dataset`] module turns
//! annotated images into training samples and splits them by patient.

pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod geometry;
pub mod models;
pub mod pipeline;

pub use config::{DatasetOptions, PipelineConfig};
pub use error::{EdemaError, Result};
pub use pipeline::EdemaNet;

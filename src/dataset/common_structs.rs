use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::NO_FINDINGS;
// Frequently used structs in the dataset loaders and transformers

/// One annotation row of the dataset metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(rename = "Image path")]
    pub img_path: String,
    #[serde(rename = "Subject ID")]
    pub subject_id: String,
    #[serde(rename = "Class")]
    pub class_name: String,
    #[serde(rename = "Class ID", default)]
    pub class_id: Option<i64>,
    #[serde(rename = "Feature", default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub x1: Option<f64>,
    #[serde(default)]
    pub y1: Option<f64>,
    #[serde(default)]
    pub x2: Option<f64>,
    #[serde(default)]
    pub y2: Option<f64>,
    /// base64 encoded bitmap, present for bitmap annotations
    #[serde(rename = "Mask", default)]
    pub mask: Option<String>,
    /// Polygon or line points, present for vector annotations
    #[serde(rename = "Points", default)]
    pub points: Option<String>,
}

impl MetadataRow {
    /// Class used for stratification, -1 when the row has none
    pub fn class_key(&self) -> i64 {
        self.class_id.unwrap_or(-1)
    }
}

/// Reads a metadata table exported as csv
pub fn read_metadata_file<T: AsRef<Path>>(path: T) -> Result<Vec<MetadataRow>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut rows = vec![];
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// A bitmap annotation placed with its top left corner at (x1, y1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitmap {
    pub x1: i64,
    pub y1: i64,
    /// base64 of a zlib compressed png
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingGeometry {
    pub polygons: Vec<Vec<(i32, i32)>>,
    pub bitmaps: Vec<Bitmap>,
}

/// Annotations of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    /// "No edema" image without any finding
    NoFindings,
    Findings(BTreeMap<String, FindingGeometry>),
}

impl Annotation {
    pub fn finding_names(&self) -> Vec<&str> {
        match self {
            Annotation::NoFindings => vec![NO_FINDINGS],
            Annotation::Findings(map) => map.keys().map(String::as_str).collect(),
        }
    }
}

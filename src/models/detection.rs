use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Detector output before it is turned into table rows
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub feature_id: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// One row of the findings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "Image path")]
    pub img_path: String,
    #[serde(rename = "Model")]
    pub model_name: String,
    #[serde(rename = "Feature ID")]
    pub feature_id: u32,
    #[serde(rename = "Feature")]
    pub feature: String,
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub xc: i64,
    pub yc: i64,
    #[serde(rename = "Box width")]
    pub box_width: i64,
    #[serde(rename = "Box height")]
    pub box_height: i64,
    #[serde(rename = "Box area")]
    pub box_area: i64,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
    /// Filled by the edema classifier
    #[serde(rename = "Class ID")]
    pub class_id: Option<u32>,
    #[serde(rename = "Class")]
    pub class_name: Option<String>,
}

impl Detection {
    pub fn new(
        img_path: String,
        model_name: String,
        feature_id: u32,
        feature: String,
        bbox: BoundingBox,
        confidence: f32,
    ) -> Detection {
        let sizes = bbox.sizes();
        Detection {
            img_path,
            model_name,
            feature_id,
            feature,
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
            xc: sizes.xc,
            yc: sizes.yc,
            box_width: sizes.width,
            box_height: sizes.height,
            box_area: sizes.area,
            confidence,
            class_id: None,
            class_name: None,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x1, self.y1, self.x2, self.y2)
    }
}

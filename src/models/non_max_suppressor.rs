use tracing::debug;

use super::{Detection, NonMaxSuppressor};

/// Greedy suppression: the most confident detection of a feature removes every
/// other detection of the same feature overlapping it by `iou_threshold` or more.
#[derive(Debug, Clone, PartialEq)]
pub struct IouSuppressor {
    pub iou_threshold: f32,
}

impl Default for IouSuppressor {
    fn default() -> Self {
        IouSuppressor { iou_threshold: 0.5 }
    }
}

impl NonMaxSuppressor for IouSuppressor {
    fn suppress(&self, mut detections: Vec<Detection>) -> anyhow::Result<Vec<Detection>> {
        let before = detections.len();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
        for det in detections {
            let bbox = det.bbox();
            let overlaps = keep.iter().any(|kept| {
                kept.feature_id == det.feature_id && kept.bbox().iou(&bbox) >= self.iou_threshold
            });
            if !overlaps {
                keep.push(det);
            }
        }
        debug!("Detections after NMS: {} of {}", keep.len(), before);
        Ok(keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn det(feature_id: u32, bbox: BoundingBox, confidence: f32) -> Detection {
        Detection::new(
            "img.png".to_string(),
            "test".to_string(),
            feature_id,
            format!("{}", feature_id),
            bbox,
            confidence,
        )
    }

    #[test]
    fn overlapping_detections_of_one_feature_are_merged() {
        let dets = vec![
            det(4, BoundingBox::new(0, 0, 10, 10), 0.6),
            det(4, BoundingBox::new(1, 1, 11, 11), 0.9),
            det(4, BoundingBox::new(50, 50, 60, 60), 0.3),
        ];
        let kept = IouSuppressor::default().suppress(dets).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.3);
    }

    #[test]
    fn different_features_do_not_suppress_each_other() {
        let dets = vec![
            det(4, BoundingBox::new(0, 0, 10, 10), 0.6),
            det(6, BoundingBox::new(0, 0, 10, 10), 0.9),
        ];
        let kept = IouSuppressor::default().suppress(dets).unwrap();
        assert_eq!(kept.len(), 2);
    }
}

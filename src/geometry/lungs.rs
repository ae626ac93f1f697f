use image::GrayImage;
use imageproc::contours::find_contours;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EdemaError, Result};
use crate::features::{feature_id, BoxSizes, LUNGS};
use crate::geometry::BoundingBox;

/// Box around every lung region found in a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LungsMetadata {
    pub feature_id: u32,
    pub feature: String,
    pub bbox: BoundingBox,
    pub sizes: BoxSizes,
}

/// Finds the outer and hole contours of every non-zero region and returns the box
/// spanning all of them, so left and right lung end up in a single box.
pub fn compute_lungs_metadata(mask: &GrayImage) -> Result<LungsMetadata> {
    let contours = find_contours::<i64>(mask);
    debug!("Found {} contours in lung mask", contours.len());

    let bbox = contours
        .iter()
        .filter_map(|contour| {
            let (x_min, x_max) = contour.points.iter().map(|p| p.x).minmax().into_option()?;
            let (y_min, y_max) = contour.points.iter().map(|p| p.y).minmax().into_option()?;
            Some(BoundingBox::new(x_min, y_min, x_max + 1, y_max + 1))
        })
        .reduce(|acc, b| acc.union(&b))
        .ok_or(EdemaError::NoContours)?;

    Ok(LungsMetadata {
        feature_id: feature_id(LUNGS).unwrap_or_default(),
        feature: LUNGS.to_string(),
        bbox,
        sizes: bbox.sizes(),
    })
}

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use itertools::Itertools;
use tracing::warn;

use super::common_structs::{Annotation, Bitmap, FindingGeometry, MetadataRow};
use crate::error::{EdemaError, Result};

const NO_EDEMA_CLASS: &str = "No edema";
/// Feature listed on "No edema" images that carry no finding
const NO_EDEMA_FEATURE: &str = "Heart";

/// Parses every run of digits as an integer and pairs them into points,
/// e.g. `"[[10, 20], [30, 40]]"` gives `[(10, 20), (30, 40)]`.
pub fn parse_coord_string(coord_string: &str) -> Result<Vec<(i32, i32)>> {
    let numbers = coord_string
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i32>())
        .collect::<std::result::Result<Vec<i32>, _>>()
        .map_err(|_| EdemaError::InvalidCoordinates(coord_string.to_string()))?;
    if numbers.len() % 2 != 0 {
        return Err(EdemaError::InvalidCoordinates(coord_string.to_string()));
    }
    Ok(numbers.into_iter().tuples().collect())
}

/// Rows grouped per image, images in order of first appearance
pub fn group_by_image(rows: &[MetadataRow]) -> Vec<(&str, Vec<&MetadataRow>)> {
    let mut groups: Vec<(&str, Vec<&MetadataRow>)> = vec![];
    let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        let path = row.img_path.as_str();
        let pos = *positions.entry(path).or_insert_with(|| {
            groups.push((path, vec![]));
            groups.len() - 1
        });
        groups[pos].1.push(row);
    }
    groups
}

/// Builds the annotation of one image from its metadata rows.
///
/// An image whose rows are all of class "No edema" and only list the heart has no
/// findings. Otherwise each row with a bitmap adds a bitmap to its finding and every
/// other row adds a polygon parsed from its points; a row with neither is an error.
pub fn extract_annotations(rows: &[&MetadataRow]) -> Result<Annotation> {
    if rows.is_empty() {
        return Err(EdemaError::EmptyAnnotationGroup);
    }
    let no_edema = rows.iter().all(|r| r.class_name == NO_EDEMA_CLASS)
        && rows
            .iter()
            .all(|r| r.feature.as_deref() == Some(NO_EDEMA_FEATURE));
    if no_edema {
        return Ok(Annotation::NoFindings);
    }

    let mut findings: BTreeMap<String, FindingGeometry> = BTreeMap::new();
    for row in rows {
        let feature = match &row.feature {
            Some(feature) => feature,
            None => {
                warn!("Skipping row of {} without a feature", row.img_path);
                continue;
            }
        };
        let geometry = findings.entry(feature.clone()).or_default();
        match (&row.mask, &row.points) {
            (Some(mask), _) if !mask.is_empty() => {
                let (x1, y1) = match (row.x1, row.y1) {
                    (Some(x1), Some(y1)) => (x1 as i64, y1 as i64),
                    _ => {
                        return Err(EdemaError::InvalidBitmap(format!(
                            "bitmap of {} in {} has no offset",
                            feature, row.img_path
                        )))
                    }
                };
                geometry.bitmaps.push(Bitmap {
                    x1,
                    y1,
                    data: mask.clone(),
                });
            }
            (_, Some(points)) => geometry.polygons.push(parse_coord_string(points)?),
            _ => return Err(EdemaError::MissingGeometry(feature.clone())),
        }
    }
    Ok(Annotation::Findings(findings))
}

/// Decodes a base64 zlib-compressed png into a 0/1 mask; pixels with a non-zero
/// alpha belong to the mask.
pub fn convert_base64_to_mask(data: &str) -> Result<GrayImage> {
    let compressed = STANDARD
        .decode(data.trim())
        .map_err(|e| EdemaError::InvalidBitmap(e.to_string()))?;
    let mut png = vec![];
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut png)
        .map_err(|e| EdemaError::InvalidBitmap(e.to_string()))?;
    let rgba = image::load_from_memory(&png)?.to_rgba8();
    Ok(GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([(rgba.get_pixel(x, y)[3] > 0) as u8])
    }))
}

/// Inverse of [`convert_base64_to_mask`] for a mask where non-zero pixels are set.
pub fn convert_mask_to_base64(mask: &GrayImage) -> Result<String> {
    let rgba = RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let mut png = Cursor::new(vec![]);
    DynamicImage::ImageRgba8(rgba).write_to(&mut png, ImageFormat::Png)?;
    let mut encoder = ZlibEncoder::new(vec![], Compression::default());
    encoder.write_all(png.get_ref())?;
    Ok(STANDARD.encode(encoder.finish()?))
}

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, Rgb32FImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use itertools::Itertools;
use ndarray::Array3;
use tracing::debug;

use super::annotations::convert_base64_to_mask;
use super::common_structs::{Annotation, FindingGeometry};
use crate::error::{EdemaError, Result};
use crate::features::{is_edema_finding, mask_finding_names, LINELIKE_FINDINGS, NO_FINDINGS};
use crate::geometry::{resize_and_pad, ResizeRule};

/// Masks of one image, one per entry of [`mask_finding_names`].
///
/// Masks hold 0 where a finding is drawn and `default_mask_value` elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingMasks {
    pub names: Vec<&'static str>,
    pub masks: Vec<GrayImage>,
    /// 1 if the finding is annotated on the image, 0 otherwise
    pub findings: Vec<u8>,
    pub default_mask_value: u8,
}

/// Image and masks resized and padded to the training size
#[derive(Debug, Clone, PartialEq)]
pub struct ResizedSample {
    pub image: Rgb32FImage,
    pub masks: FindingMasks,
}

/// Rasterizes the annotation of an image of `(width, height)` into finding masks.
pub fn make_masks(
    (width, height): (u32, u32),
    annotation: &Annotation,
    linelike_finding_width: u32,
) -> Result<FindingMasks> {
    let present = annotation.finding_names();
    let default_mask_value = present.iter().any(|f| is_edema_finding(f)) as u8;
    let no_findings_only = present.first() == Some(&NO_FINDINGS);

    let names = mask_finding_names();
    let mut masks = Vec::with_capacity(names.len());
    let mut findings = Vec::with_capacity(names.len());
    for name in names.iter().copied() {
        let mut mask = GrayImage::from_pixel(width, height, Luma([default_mask_value]));
        match annotation {
            Annotation::NoFindings if name == NO_FINDINGS => {
                findings.push(1);
            }
            Annotation::Findings(map) if map.contains_key(name) => {
                draw_finding(&mut mask, name, &map[name], linelike_finding_width)?;
                findings.push(1);
            }
            _ if no_findings_only => {
                mask = GrayImage::from_pixel(width, height, Luma([1]));
                findings.push(0);
            }
            _ => findings.push(0),
        }
        masks.push(mask);
    }
    debug!(
        "Made {} masks, findings {:?}, default value {}",
        masks.len(),
        findings,
        default_mask_value
    );
    Ok(FindingMasks {
        names,
        masks,
        findings,
        default_mask_value,
    })
}

fn draw_finding(
    mask: &mut GrayImage,
    name: &str,
    geometry: &FindingGeometry,
    linelike_finding_width: u32,
) -> Result<()> {
    if !geometry.polygons.is_empty() {
        let linelike = LINELIKE_FINDINGS.contains(&name);
        for points in &geometry.polygons {
            if linelike {
                draw_thick_polyline(mask, points, linelike_finding_width);
            } else {
                fill_polygon(mask, points);
            }
        }
    } else if !geometry.bitmaps.is_empty() {
        for bitmap in &geometry.bitmaps {
            let mut inverted = convert_base64_to_mask(&bitmap.data)?;
            inverted.pixels_mut().for_each(|p| p[0] = 1 - p[0]);
            imageops::replace(mask, &inverted, bitmap.x1, bitmap.y1);
        }
    } else {
        return Err(EdemaError::MissingGeometry(name.to_string()));
    }
    Ok(())
}

/// Fills a polygon with 0. Degenerate polygons are drawn as a point or a segment.
fn fill_polygon(mask: &mut GrayImage, points: &[(i32, i32)]) {
    let mut poly: Vec<Point<i32>> = points
        .iter()
        .map(|&(x, y)| Point::new(x, y))
        .dedup()
        .collect();
    if poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    match poly.len() {
        0 => {}
        1 => {
            let (x, y) = (poly[0].x, poly[0].y);
            if x >= 0 && y >= 0 && (x as u32) < mask.width() && (y as u32) < mask.height() {
                mask.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
        2 => draw_line_segment_mut(
            mask,
            (poly[0].x as f32, poly[0].y as f32),
            (poly[1].x as f32, poly[1].y as f32),
            Luma([0]),
        ),
        _ => draw_polygon_mut(mask, &poly, Luma([0])),
    }
}

/// Draws consecutive points as segments `width` pixels wide.
fn draw_thick_polyline(mask: &mut GrayImage, points: &[(i32, i32)], width: u32) {
    let half = width.max(1) as f32 / 2.;
    if points.len() == 1 {
        let (x, y) = points[0];
        draw_filled_circle_mut(mask, (x, y), half.floor() as i32, Luma([0]));
    }
    for (&(x0, y0), &(x1, y1)) in points.iter().tuple_windows() {
        let (dx, dy) = ((x1 - x0) as f32, (y1 - y0) as f32);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0. {
            draw_filled_circle_mut(mask, (x0, y0), half.floor() as i32, Luma([0]));
            continue;
        }
        let (nx, ny) = (-dy / length * half, dx / length * half);
        let corner = |x: i32, y: i32, sign: f32| {
            (
                (x as f32 + sign * nx).round() as i32,
                (y as f32 + sign * ny).round() as i32,
            )
        };
        let quad = [
            corner(x0, y0, 1.),
            corner(x1, y1, 1.),
            corner(x1, y1, -1.),
            corner(x0, y0, -1.),
        ];
        fill_polygon(mask, &quad);
    }
}

/// Rasterizes the masks of `image` and brings both to `target_size`: the image with
/// bilinear filtering padded with 0, the masks with nearest neighbour padded with the
/// default mask value.
pub fn resize_and_create_masks(
    image: &DynamicImage,
    annotation: &Annotation,
    target_size: (u32, u32),
    linelike_finding_width: u32,
) -> Result<ResizedSample> {
    let image = image.to_rgb32f();
    let mut masks = make_masks(image.dimensions(), annotation, linelike_finding_width)?;
    let rule = ResizeRule::for_padding(image.dimensions(), target_size);
    debug!("Resizing {:?} with {:?}", image.dimensions(), rule);

    let image = resize_and_pad(&image, rule, target_size, Rgb([0., 0., 0.]), FilterType::Triangle);
    let fill = Luma([masks.default_mask_value]);
    masks.masks = masks
        .masks
        .iter()
        .map(|m| resize_and_pad(m, rule, target_size, fill, FilterType::Nearest))
        .collect();
    Ok(ResizedSample { image, masks })
}

/// Stacks the image channels and the masks into a `(channels, height, width)` array.
pub fn combine_image_and_masks(image: &Rgb32FImage, masks: &[GrayImage]) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    if let Some(mask) = masks.iter().find(|m| m.dimensions() != (width, height)) {
        return Err(EdemaError::SizeMismatch {
            image: (width, height),
            mask: mask.dimensions(),
        });
    }
    Ok(Array3::from_shape_fn(
        (3 + masks.len(), height as usize, width as usize),
        |(c, y, x)| {
            if c < 3 {
                image.get_pixel(x as u32, y as u32)[c]
            } else {
                masks[c - 3].get_pixel(x as u32, y as u32)[0] as f32
            }
        },
    ))
}

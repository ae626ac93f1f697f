use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};

use crate::error::{EdemaError, Result};
use crate::geometry::BoundingBox;

/// Image buffer with owned storage, the only kind the transforms produce.
pub type Raster<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Rule picking the size of a resized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeRule {
    /// Longest side becomes the given size
    LongestMaxSize(u32),
    /// Smallest side becomes the given size
    SmallestMaxSize(u32),
    /// Exact (width, height)
    Exact(u32, u32),
}

impl ResizeRule {
    /// Picks the rule that scales an image of `(width, height)` up or down to fit
    /// `target_size` without exceeding it, mimicking aspect-preserving padding.
    pub fn for_padding(
        (width_0, height_0): (u32, u32),
        (width_new, height_new): (u32, u32),
    ) -> ResizeRule {
        let aspect_0 = width_0 as f64 / height_0 as f64;
        let aspect_new = width_new as f64 / height_new as f64;
        if aspect_0 < aspect_new {
            if width_0 > height_0 {
                ResizeRule::SmallestMaxSize(height_new)
            } else {
                ResizeRule::LongestMaxSize(height_new)
            }
        } else if aspect_0 > aspect_new {
            if width_0 > height_0 {
                ResizeRule::LongestMaxSize(width_new)
            } else {
                ResizeRule::SmallestMaxSize(width_new)
            }
        } else {
            ResizeRule::Exact(width_new, height_new)
        }
    }

    pub fn target_dimensions(&self, (width, height): (u32, u32)) -> (u32, u32) {
        match *self {
            ResizeRule::LongestMaxSize(size) => {
                scale_dims((width, height), size as f64 / width.max(height) as f64)
            }
            ResizeRule::SmallestMaxSize(size) => {
                scale_dims((width, height), size as f64 / width.min(height) as f64)
            }
            ResizeRule::Exact(w, h) => (w, h),
        }
    }
}

fn scale_dims((width, height): (u32, u32), scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Size of `(width, height)` scaled to fit inside `output_size` keeping its aspect ratio.
pub fn fit_within((width, height): (u32, u32), (out_w, out_h): (u32, u32)) -> (u32, u32) {
    let scale = (out_w as f64 / width as f64).min(out_h as f64 / height as f64);
    let (w, h) = scale_dims((width, height), scale);
    (w.min(out_w), h.min(out_h))
}

/// Pads `img` with `fill` on all sides so it is centred in a `(width, height)` canvas.
/// Images already larger than the canvas along a side are not padded along it.
pub fn pad_center<P>(img: &Raster<P>, (width, height): (u32, u32), fill: P) -> Raster<P>
where
    P: Pixel + 'static,
{
    let (w, h) = img.dimensions();
    let (out_w, out_h) = (width.max(w), height.max(h));
    let left = (out_w - w) / 2;
    let top = (out_h - h) / 2;
    let mut canvas = ImageBuffer::from_pixel(out_w, out_h, fill);
    imageops::replace(&mut canvas, img, left as i64, top as i64);
    canvas
}

/// Crops `img` to `bbox`, resizes the crop keeping its aspect ratio and centre-pads
/// it with `fill` to exactly `output_size` (width, height).
///
/// The same box and size applied to an image and its mask keep them aligned.
pub fn process_image<P>(
    img: &Raster<P>,
    bbox: &BoundingBox,
    output_size: (u32, u32),
    fill: P,
    filter: FilterType,
) -> Result<Raster<P>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (img_w, img_h) = img.dimensions();
    let region = bbox.clip(img_w, img_h);
    if region.width() <= 0 || region.height() <= 0 {
        return Err(EdemaError::EmptyRegion(*bbox));
    }
    let crop_dims = (region.width() as u32, region.height() as u32);
    let crop = imageops::crop_imm(img, region.x1 as u32, region.y1 as u32, crop_dims.0, crop_dims.1)
        .to_image();

    let (new_w, new_h) = fit_within(crop_dims, output_size);
    let resized = imageops::resize(&crop, new_w, new_h, filter);
    Ok(pad_center(&resized, output_size, fill))
}

/// Resizes according to `rule` and pads to `target_size` with `fill`.
pub fn resize_and_pad<P>(
    img: &Raster<P>,
    rule: ResizeRule,
    target_size: (u32, u32),
    fill: P,
    filter: FilterType,
) -> Raster<P>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (new_w, new_h) = rule.target_dimensions(img.dimensions());
    let resized = imageops::resize(img, new_w, new_h, filter);
    pad_center(&resized, target_size, fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn output_has_exact_size_for_any_box_aspect() {
        let img = GrayImage::from_pixel(200, 100, Luma([200]));
        let boxes = [
            BoundingBox::new(50, 20, 150, 80),
            BoundingBox::new(0, 0, 10, 100),
            BoundingBox::new(0, 40, 200, 45),
            BoundingBox::new(-20, -20, 220, 120),
        ];
        for output_size in [(64, 64), (80, 40), (30, 90)] {
            for bbox in boxes.iter() {
                let out = process_image(&img, bbox, output_size, Luma([0]), FilterType::Nearest).unwrap();
                assert_eq!(out.dimensions(), output_size);
            }
        }
    }

    #[test]
    fn padding_uses_fill_and_content_is_centred() {
        let img = GrayImage::from_pixel(200, 100, Luma([200]));
        // 100x60 crop scaled by 0.64 -> 64x38, padded 13 rows on each side
        let bbox = BoundingBox::new(50, 20, 150, 80);
        let out = process_image(&img, &bbox, (64, 64), Luma([7]), FilterType::Nearest).unwrap();
        for x in 0..64 {
            for y in (0..13).chain(51..64) {
                assert_eq!(out.get_pixel(x, y)[0], 7);
            }
            for y in 13..51 {
                assert_eq!(out.get_pixel(x, y)[0], 200);
            }
        }
    }

    #[test]
    fn crop_keeps_selected_region() {
        let mut img = GrayImage::new(40, 40);
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let bbox = BoundingBox::new(10, 10, 20, 20);
        let out = process_image(&img, &bbox, (20, 20), Luma([0]), FilterType::Nearest).unwrap();
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn empty_box_is_rejected() {
        let img = GrayImage::new(20, 20);
        let bbox = BoundingBox::new(15, 5, 10, 10);
        assert!(matches!(
            process_image(&img, &bbox, (8, 8), Luma([0]), FilterType::Nearest),
            Err(EdemaError::EmptyRegion(_))
        ));
        let outside = BoundingBox::new(30, 30, 40, 40);
        assert!(process_image(&img, &outside, (8, 8), Luma([0]), FilterType::Nearest).is_err());
    }

    #[test]
    fn resize_rule_selection() {
        assert_eq!(
            ResizeRule::for_padding((100, 50), (64, 64)),
            ResizeRule::LongestMaxSize(64)
        );
        assert_eq!(
            ResizeRule::for_padding((50, 100), (64, 64)),
            ResizeRule::LongestMaxSize(64)
        );
        assert_eq!(
            ResizeRule::for_padding((300, 200), (200, 100)),
            ResizeRule::SmallestMaxSize(100)
        );
        assert_eq!(
            ResizeRule::for_padding((100, 200), (200, 100)),
            ResizeRule::LongestMaxSize(100)
        );
        assert_eq!(
            ResizeRule::for_padding((50, 100), (20, 100)),
            ResizeRule::SmallestMaxSize(20)
        );
        assert_eq!(
            ResizeRule::for_padding((30, 20), (60, 40)),
            ResizeRule::Exact(60, 40)
        );
    }

    #[test]
    fn resize_rules_never_exceed_target() {
        let targets = [(64, 64), (200, 100), (90, 160)];
        let sources = [(100, 50), (50, 100), (300, 200), (100, 200), (7, 640), (640, 7), (64, 64)];
        for target in targets.iter() {
            for source in sources.iter() {
                let (w, h) = ResizeRule::for_padding(*source, *target).target_dimensions(*source);
                assert!(w <= target.0 && h <= target.1, "{:?} -> {:?}", source, target);
                assert!(w == target.0 || h == target.1, "{:?} -> {:?}", source, target);
            }
        }
    }

    #[test]
    fn resize_and_pad_fills_borders() {
        let img = GrayImage::from_pixel(100, 50, Luma([9]));
        let rule = ResizeRule::for_padding((100, 50), (64, 64));
        let out = resize_and_pad(&img, rule, (64, 64), Luma([1]), FilterType::Nearest);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(0, 0)[0], 1);
        assert_eq!(out.get_pixel(32, 32)[0], 9);
        assert_eq!(out.get_pixel(63, 63)[0], 1);
    }
}

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use tracing::debug;

use crate::error::{EdemaError, Result};

pub type MapBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Keeps the fused probability away from 0/0 when a model is fully certain.
const EPSILON: f64 = 1e-7;

/// Value range of a probability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapScale {
    /// Probabilities in `[0, 1]`
    Unit,
    /// Probabilities in `[0, 255]`, the range the maps are saved with
    Display,
}

impl MapScale {
    pub fn max_value(self) -> f32 {
        match self {
            MapScale::Unit => 1.,
            MapScale::Display => 255.,
        }
    }
}

/// Lung probability map of one segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbMap {
    data: MapBuffer,
    scale: MapScale,
}

impl ProbMap {
    pub fn new(data: MapBuffer, scale: MapScale) -> ProbMap {
        ProbMap { data, scale }
    }

    pub fn from_gray(img: &GrayImage) -> ProbMap {
        let data = MapBuffer::from_fn(img.width(), img.height(), |x, y| {
            Luma([img.get_pixel(x, y)[0] as f32])
        });
        ProbMap::new(data, MapScale::Display)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    pub fn scale(&self) -> MapScale {
        self.scale
    }

    pub fn as_buffer(&self) -> &MapBuffer {
        &self.data
    }

    /// Probability in `[0, 1]` at a pixel regardless of the map's scale
    pub fn probability(&self, x: u32, y: u32) -> f32 {
        (self.data.get_pixel(x, y)[0] / self.scale.max_value()).clamp(0., 1.)
    }

    pub fn rescaled(&self, scale: MapScale) -> ProbMap {
        let factor = scale.max_value() / self.scale.max_value();
        let mut data = self.data.clone();
        data.pixels_mut().for_each(|p| p[0] *= factor);
        ProbMap::new(data, scale)
    }

    /// Resized map in the same scale; resampling happens on unit probabilities since
    /// float pixels are clamped to `[0, 1]` by the resampler.
    pub fn resize(&self, width: u32, height: u32, filter: FilterType) -> ProbMap {
        let unit = self.rescaled(MapScale::Unit);
        let mut data = imageops::resize(&unit.data, width, height, filter);
        data.pixels_mut().for_each(|p| p[0] = p[0].clamp(0., 1.));
        ProbMap::new(data, MapScale::Unit).rescaled(self.scale)
    }

    /// 8-bit rendering, 255 for probability 1
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            Luma([(self.probability(x, y) * 255.).round() as u8])
        })
    }
}

/// Collects the probability maps predicted for one image and fuses them.
///
/// A fuser belongs to a single image: create one per image or call [`MapFuser::reset`]
/// before reusing it.
#[derive(Debug, Default)]
pub struct MapFuser {
    prob_maps: Vec<ProbMap>,
}

impl MapFuser {
    pub fn new() -> MapFuser {
        MapFuser::default()
    }

    /// Stores a map; every map must have the size of the first one.
    pub fn add_prob_map(&mut self, prob_map: ProbMap) -> Result<()> {
        if let Some(first) = self.prob_maps.first() {
            if first.dimensions() != prob_map.dimensions() {
                return Err(EdemaError::MapShapeMismatch {
                    expected: first.dimensions(),
                    actual: prob_map.dimensions(),
                });
            }
        }
        self.prob_maps.push(prob_map);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.prob_maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prob_maps.is_empty()
    }

    pub fn reset(&mut self) {
        self.prob_maps.clear();
    }

    /// Fuses the stored maps treating each as an independent estimate of the same
    /// event: `p = Π pᵢ / (Π pᵢ + Π (1 - pᵢ))` per pixel.
    ///
    /// Pixel values are sorted before multiplying so the result does not depend on
    /// the order the maps were added in.
    pub fn conditional_probability_fusion(&self, scale_output: bool) -> Result<ProbMap> {
        let (width, height) = self
            .prob_maps
            .first()
            .map(ProbMap::dimensions)
            .ok_or(EdemaError::NoProbMaps)?;
        debug!("Fusing {} probability maps", self.prob_maps.len());

        let out_scale = if scale_output {
            MapScale::Display
        } else {
            MapScale::Unit
        };
        let mut values: Vec<f64> = Vec::with_capacity(self.prob_maps.len());
        let fused = MapBuffer::from_fn(width, height, |x, y| {
            values.clear();
            values.extend(
                self.prob_maps
                    .iter()
                    .map(|m| (m.probability(x, y) as f64).clamp(EPSILON, 1. - EPSILON)),
            );
            values.sort_by(|a, b| a.total_cmp(b));
            let positive: f64 = values.iter().product();
            let negative: f64 = values.iter().map(|p| 1. - p).product();
            let denominator = positive + negative;
            let p = if denominator > 0. {
                positive / denominator
            } else {
                0.5
            };
            Luma([p as f32 * out_scale.max_value()])
        });
        Ok(ProbMap::new(fused, out_scale))
    }
}

// depth/mod.rs - Depth estimation from a single image
//
// Model path first. When there is no model, or it fails, depth is guessed
// from image gradients: busy regions are treated as near, flat ones as far.
// Whatever the path, the map is min-max normalized last.

mod model;
mod surface;

pub use model::{DepthModel, OnnxDepthModel, Unavailable};
pub use surface::{discontinuities, surface_normals};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::cloud::{self, DepthProfile, PointCloud};
use crate::outcome::Outcome;
use crate::raster::GrayF32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    pub diameter: usize,
    /// On the 0-255 scale of an 8-bit depth image.
    pub sigma_color: f32,
    pub sigma_space: f32,
    pub inpaint_radius: usize,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self { diameter: 9, sigma_color: 75.0, sigma_space: 75.0, inpaint_radius: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub model: Option<PathBuf>,
    pub input_size: u32,
    pub enhance: EnhanceParams,
    /// Kernel size of the blur applied to the gradient fallback.
    pub fallback_blur: usize,
    pub discontinuity_threshold: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            model: None,
            input_size: 384,
            enhance: EnhanceParams::default(),
            fallback_blur: 5,
            discontinuity_threshold: 0.1,
        }
    }
}

/// Relative depth per pixel. Larger is nearer.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    grid: GrayF32,
}

impl DepthMap {
    pub fn from_raster(grid: GrayF32) -> Self {
        Self { grid }
    }

    pub fn raster(&self) -> &GrayF32 {
        &self.grid
    }

    pub fn width(&self) -> usize {
        self.grid.w
    }

    pub fn height(&self) -> usize {
        self.grid.h
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.grid.get(x, y)
    }

    pub fn values(&self) -> &[f32] {
        &self.grid.data
    }

    /// Rescale to [0, 1]. A constant map becomes all zeros.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        let Some((min, max)) = self.grid.min_max() else { return self };
        let span = max - min;
        if !(span > 0.0) || !span.is_finite() {
            self.grid.data.iter_mut().for_each(|v| *v = 0.0);
            return self;
        }
        self.grid.data.iter_mut().for_each(|v| *v = (*v - min) / span);
        self
    }
}

pub struct DepthEstimator {
    model: Box<dyn DepthModel>,
    enhance: EnhanceParams,
    fallback_blur: usize,
    discontinuity_threshold: f32,
}

impl Default for DepthEstimator {
    fn default() -> Self {
        Self::new(Box::new(Unavailable))
    }
}

impl DepthEstimator {
    pub fn new(model: Box<dyn DepthModel>) -> Self {
        let cfg = DepthConfig::default();
        Self {
            model,
            enhance: cfg.enhance,
            fallback_blur: cfg.fallback_blur,
            discontinuity_threshold: cfg.discontinuity_threshold,
        }
    }

    pub fn from_config(cfg: &DepthConfig) -> Self {
        let model: Box<dyn DepthModel> = match &cfg.model {
            Some(path) => Box::new(OnnxDepthModel::new(path, cfg.input_size)),
            None => Box::new(Unavailable),
        };
        Self {
            model,
            enhance: cfg.enhance.clone(),
            fallback_blur: cfg.fallback_blur,
            discontinuity_threshold: cfg.discontinuity_threshold,
        }
    }

    pub fn estimate(&self, img: &RgbImage, enhanced: bool) -> Outcome<DepthMap> {
        let (w, h) = img.dimensions();
        info!(width = w, height = h, enhanced, "Estimating depth");

        match self.model.predict(img) {
            Ok(raw) if raw.w == w as usize && raw.h == h as usize => {
                let mut depth = DepthMap::from_raster(raw).normalize();
                if enhanced {
                    depth = self.enhance(depth);
                }
                Outcome::Full(depth.normalize())
            }
            Ok(raw) => {
                let reason = format!("model returned {}x{} for a {w}x{h} image", raw.w, raw.h);
                warn!(reason = %reason, "Depth model output unusable, using gradient fallback");
                Outcome::degraded(self.gradient_fallback(img), reason)
            }
            Err(e) => {
                warn!(error = %e, "Depth model unavailable, using gradient fallback");
                Outcome::degraded(self.gradient_fallback(img), e.to_string())
            }
        }
    }

    /// Bilateral smoothing on the 8-bit scale, then fill every pixel the
    /// smoothing left at exactly zero from its neighbourhood.
    fn enhance(&self, depth: DepthMap) -> DepthMap {
        let p = &self.enhance;
        let mut levels = depth.grid;
        levels.data.iter_mut().for_each(|v| *v = (*v * 255.0).floor());

        let mut smoothed = levels.bilateral(p.diameter, p.sigma_color, p.sigma_space);
        smoothed.data.iter_mut().for_each(|v| *v = v.floor());

        let holes: Vec<bool> = smoothed.data.iter().map(|&v| v == 0.0).collect();
        let hole_count = holes.iter().filter(|&&m| m).count();
        if hole_count > 0 {
            debug!(holes = hole_count, "Inpainting depth holes");
            smoothed = smoothed.inpaint(&holes, p.inpaint_radius);
        }

        smoothed.data.iter_mut().for_each(|v| *v /= 255.0);
        DepthMap::from_raster(smoothed)
    }

    /// Depth from inverted gradient magnitude of the gray image.
    pub fn gradient_fallback(&self, img: &RgbImage) -> DepthMap {
        let mut gray = GrayF32::luma_from_rgb(img);
        gray.data.iter_mut().for_each(|v| *v = v.round());

        let mut inverted = gray.sobel_magnitude();
        inverted.data.iter_mut().for_each(|v| *v = 255.0 - *v);
        let smoothed = inverted.gaussian_blur(self.fallback_blur, 0.0);
        DepthMap::from_raster(smoothed).normalize()
    }

    pub fn surface_normals(&self, depth: &DepthMap) -> Vec<nalgebra::Vector3<f32>> {
        surface_normals(depth)
    }

    /// Discontinuity mask at the configured threshold.
    pub fn discontinuities(&self, depth: &DepthMap) -> Vec<u8> {
        discontinuities(depth, self.discontinuity_threshold)
    }

    /// Lift depth straight into a cloud with the direct-depth profile and
    /// default intrinsics.
    pub fn point_cloud(&self, img: &RgbImage, depth: &DepthMap) -> PointCloud {
        cloud::project(img, depth, None, &DepthProfile::direct())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, ModelResult};
    use image::Rgb;
    use proptest::prelude::*;

    struct Fixed(GrayF32);

    impl DepthModel for Fixed {
        fn predict(&self, _img: &RgbImage) -> ModelResult<GrayF32> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl DepthModel for Failing {
        fn predict(&self, _img: &RgbImage) -> ModelResult<GrayF32> {
            Err(ModelError::Runtime("bad tensor".into()))
        }
    }

    #[test]
    fn constant_map_normalizes_to_zero() {
        let d = DepthMap::from_raster(GrayF32::filled(4, 3, 7.5)).normalize();
        assert!(d.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn gray_image_fallback_is_all_zero() {
        let img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let out = DepthEstimator::default().estimate(&img, true);
        assert!(out.is_degraded());
        let d = out.into_value();
        assert_eq!((d.width(), d.height()), (100, 100));
        assert!(d.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn fallback_marks_edges_as_far() {
        let img = RgbImage::from_fn(40, 40, |x, _| if x < 20 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let d = DepthEstimator::default().gradient_fallback(&img);
        assert!(d.get(19, 20) < d.get(2, 20));
        assert!((d.get(2, 20) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn model_output_is_enhanced_and_normalized() {
        let img = RgbImage::from_pixel(12, 10, Rgb([50, 60, 70]));
        let raw = GrayF32::from_fn(12, 10, |x, y| (x + y) as f32 * 3.0 + 100.0);
        let est = DepthEstimator::new(Box::new(Fixed(raw)));
        let out = est.estimate(&img, true);
        assert!(!out.is_degraded());
        let (min, max) = out.value().raster().min_max().unwrap();
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn enhancement_fills_zero_holes() {
        // a far corner that smoothing leaves at zero gets inpainted from neighbours
        let raw = GrayF32::from_fn(16, 16, |x, y| if x < 2 && y < 2 { 0.0 } else { 1.0 });
        let est = DepthEstimator::default();
        let d = est.enhance(DepthMap::from_raster(raw));
        assert!(d.values().iter().all(|&v| v > 0.0));
    }

    #[test]
    fn wrong_sized_model_output_falls_back() {
        let img = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let est = DepthEstimator::new(Box::new(Fixed(GrayF32::filled(4, 4, 1.0))));
        assert!(est.estimate(&img, false).is_degraded());
    }

    #[test]
    fn failing_model_falls_back_with_reason() {
        let img = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let out = DepthEstimator::new(Box::new(Failing)).estimate(&img, true);
        assert!(out.reason().unwrap().contains("bad tensor"));
    }

    proptest! {
        #[test]
        fn normalize_spans_unit_interval(values in proptest::collection::vec(-1e4f32..1e4, 2..64)) {
            let n = values.len();
            let d = DepthMap::from_raster(GrayF32 { w: n, h: 1, data: values }).normalize();
            let (min, max) = d.raster().min_max().unwrap();
            prop_assert_eq!(min, 0.0);
            prop_assert!(max == 1.0 || max == 0.0);
            prop_assert!(d.values().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}

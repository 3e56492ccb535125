// analysis/mod.rs - Image analysis ahead of reconstruction
//
// Each sub-analysis runs independently. One that fails leaves its field
// empty and is recorded in `failures`; the rest of the analysis stands.

mod detect;
pub mod features;
pub mod lighting;
pub mod quality;

pub use detect::{Detection, ObjectDetector, OnnxDetector, Unavailable};
pub use features::FeatureSummary;
pub use lighting::LightingSummary;
pub use quality::QualityMetrics;

use image::{Rgb, RgbImage, imageops::FilterType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::raster::GrayF32;

/// Score used when the quality analysis could not run.
pub const NEUTRAL_QUALITY: f64 = 0.5;

// 50 mm lens on a 36 mm wide full-frame sensor
const ASSUMED_FOCAL_MM: f64 = 50.0;
const SENSOR_WIDTH_MM: f64 = 36.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub detector_model: Option<PathBuf>,
    pub detector_labels: Option<PathBuf>,
    pub detector_input_size: u32,
    pub confidence_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detector_model: None,
            detector_labels: None,
            detector_input_size: 800,
            confidence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraEstimate {
    pub focal_length_px: f64,
    pub principal_point: [f64; 2],
    /// `(width, height)`
    pub image_dimensions: [u32; 2],
}

/// Rough pinhole intrinsics for an uncalibrated photo.
pub fn estimate_camera(width: u32, height: u32) -> CameraEstimate {
    CameraEstimate {
        focal_length_px: ASSUMED_FOCAL_MM / SENSOR_WIDTH_MM * f64::from(width),
        principal_point: [f64::from(width) / 2.0, f64::from(height) / 2.0],
        image_dimensions: [width, height],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    /// `(height, width)`
    pub resolution: (u32, u32),
    pub aspect_ratio: f64,
    pub quality: Option<QualityMetrics>,
    pub objects: Vec<Detection>,
    pub people_count: usize,
    pub main_subjects: Vec<String>,
    pub lighting: Option<LightingSummary>,
    pub features: Option<FeatureSummary>,
    pub camera: Option<CameraEstimate>,
    /// Sub-analyses that did not complete, with the reason.
    pub failures: Vec<String>,
}

impl ImageAnalysis {
    pub fn quality_score(&self) -> f64 {
        self.quality
            .map(|q| q.quality_score)
            .filter(|q| q.is_finite())
            .unwrap_or(NEUTRAL_QUALITY)
    }

    pub fn focal_length(&self) -> Option<f64> {
        self.camera.map(|c| c.focal_length_px)
    }
}

pub struct ImageAnalyzer {
    detector: Box<dyn ObjectDetector>,
    confidence_threshold: f64,
}

impl Default for ImageAnalyzer {
    fn default() -> Self {
        Self::new(Box::new(Unavailable))
    }
}

impl ImageAnalyzer {
    pub fn new(detector: Box<dyn ObjectDetector>) -> Self {
        Self { detector, confidence_threshold: AnalysisConfig::default().confidence_threshold }
    }

    /// Build from configuration; a detector that cannot be loaded is logged
    /// and replaced by `Unavailable`.
    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        let detector: Box<dyn ObjectDetector> = match (&cfg.detector_model, &cfg.detector_labels) {
            (Some(model), Some(labels)) => match OnnxDetector::load(model, labels, cfg.detector_input_size) {
                Ok(d) => Box::new(d),
                Err(e) => {
                    warn!(error = %e, "Object detector not available");
                    Box::new(Unavailable)
                }
            },
            _ => Box::new(Unavailable),
        };
        Self { detector, confidence_threshold: cfg.confidence_threshold }
    }

    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn analyze(&self, img: &RgbImage) -> ImageAnalysis {
        let (w, h) = img.dimensions();
        info!(width = w, height = h, "Analyzing image");

        let mut analysis = ImageAnalysis {
            resolution: (h, w),
            aspect_ratio: if h > 0 { f64::from(w) / f64::from(h) } else { 0.0 },
            ..ImageAnalysis::default()
        };

        if let Err(e) = non_empty(img) {
            for what in ["quality", "detection", "lighting", "features", "camera"] {
                record(&mut analysis, what, &e);
            }
            return analysis;
        }

        let gray = quantized_gray(img);
        analysis.quality = Some(quality::measure(&gray));

        match self.detector.detect(img) {
            Ok(objects) => self.summarize_detections(&mut analysis, objects),
            Err(e) => record(&mut analysis, "detection", &AnalysisError::from(e)),
        }

        analysis.lighting = Some(lighting::measure(img));
        analysis.features = Some(features::measure(&gray));
        analysis.camera = Some(estimate_camera(w, h));

        debug!(
            quality = analysis.quality_score(),
            people = analysis.people_count,
            failures = analysis.failures.len(),
            "Image analysis complete"
        );
        analysis
    }

    fn summarize_detections(&self, analysis: &mut ImageAnalysis, objects: Vec<Detection>) {
        for obj in objects {
            if obj.confidence <= self.confidence_threshold {
                continue;
            }
            if obj.label.to_lowercase().contains("person") {
                analysis.people_count += 1;
                analysis.main_subjects.push(obj.label.clone());
            }
            analysis.objects.push(obj);
        }
    }
}

fn record(analysis: &mut ImageAnalysis, what: &str, err: &AnalysisError) {
    warn!(analysis = what, error = %err, "Sub-analysis failed");
    analysis.failures.push(format!("{what}: {err}"));
}

fn non_empty(img: &RgbImage) -> AnalysisResult<()> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(AnalysisError::EmptyImage { width, height });
    }
    Ok(())
}

/// 8-bit grayscale levels as floats.
fn quantized_gray(img: &RgbImage) -> GrayF32 {
    let mut g = GrayF32::luma_from_rgb(img);
    g.data.iter_mut().for_each(|v| *v = v.round());
    g
}

/// Image letterboxed into a square for a fixed-size model input.
#[derive(Debug, Clone)]
pub struct Letterboxed {
    pub image: RgbImage,
    pub pad_x: u32,
    pub pad_y: u32,
    pub content_width: u32,
    pub content_height: u32,
}

/// Fit the image inside `target x target` preserving aspect ratio, padding
/// the remainder with black.
pub fn preprocess_for_depth(img: &RgbImage, target: u32) -> Letterboxed {
    let (w, h) = img.dimensions();
    let (nw, nh) = if w == 0 || h == 0 {
        (0, 0)
    } else if w > h {
        (target, (u64::from(h) * u64::from(target) / u64::from(w)) as u32)
    } else {
        ((u64::from(w) * u64::from(target) / u64::from(h)) as u32, target)
    };
    let (nw, nh) = (nw.max(1).min(target), nh.max(1).min(target));
    let pad_x = (target - nw) / 2;
    let pad_y = (target - nh) / 2;

    let mut canvas = RgbImage::from_pixel(target, target, Rgb([0, 0, 0]));
    if w > 0 && h > 0 {
        let resized = image::imageops::resize(img, nw, nh, FilterType::Triangle);
        image::imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));
    }

    Letterboxed { image: canvas, pad_x, pad_y, content_width: nw, content_height: nh }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, ModelResult};
    use approx::assert_relative_eq;

    struct Fixed(Vec<Detection>);

    impl ObjectDetector for Fixed {
        fn detect(&self, _img: &RgbImage) -> ModelResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl ObjectDetector for Broken {
        fn detect(&self, _img: &RgbImage) -> ModelResult<Vec<Detection>> {
            Err(ModelError::Runtime("session crashed".into()))
        }
    }

    fn det(label: &str, confidence: f64) -> Detection {
        Detection { label: label.into(), confidence }
    }

    #[test]
    fn camera_estimate_uses_fifty_mm() {
        let c = estimate_camera(720, 480);
        assert_relative_eq!(c.focal_length_px, 1000.0);
        assert_eq!(c.principal_point, [360.0, 240.0]);
    }

    #[test]
    fn gray_image_analysis() {
        let img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let a = ImageAnalyzer::default().analyze(&img);
        assert_eq!(a.resolution, (100, 100));
        assert_relative_eq!(a.aspect_ratio, 1.0);
        assert!(a.failures.is_empty());
        assert!(a.objects.is_empty());
        assert_relative_eq!(a.quality_score(), 0.4, epsilon = 1e-9);
        assert_eq!(a.features.unwrap().corner_count, 0);
    }

    #[test]
    fn people_are_counted_above_threshold() {
        let detector = Fixed(vec![
            det("person", 0.9),
            det("Person", 0.7),
            det("person", 0.4),
            det("dog", 0.95),
            det("cat", 0.5),
        ]);
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let a = ImageAnalyzer::new(Box::new(detector)).analyze(&img);
        assert_eq!(a.people_count, 2);
        assert_eq!(a.main_subjects, vec!["person".to_string(), "Person".to_string()]);
        assert_eq!(a.objects.len(), 3);
    }

    #[test]
    fn detector_failure_is_recorded_not_fatal() {
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));
        let a = ImageAnalyzer::new(Box::new(Broken)).analyze(&img);
        assert!(a.objects.is_empty());
        assert_eq!(a.failures.len(), 1);
        assert!(a.failures[0].starts_with("detection"));
        assert!(a.quality.is_some());
    }

    #[test]
    fn empty_image_degrades_to_neutral_quality() {
        let a = ImageAnalyzer::default().analyze(&RgbImage::new(0, 0));
        assert!(a.quality.is_none());
        assert!(a.camera.is_none());
        assert_relative_eq!(a.quality_score(), NEUTRAL_QUALITY);
        assert_eq!(a.failures.len(), 5);
    }

    #[test]
    fn letterbox_wide_image() {
        let img = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        let l = preprocess_for_depth(&img, 384);
        assert_eq!(l.image.dimensions(), (384, 384));
        assert_eq!((l.content_width, l.content_height), (384, 192));
        assert_eq!((l.pad_x, l.pad_y), (0, 96));
        assert_eq!(l.image.get_pixel(10, 10), &Rgb([0, 0, 0]));
        assert_eq!(l.image.get_pixel(192, 192), &Rgb([255, 0, 0]));
    }
}

// lighting.rs - Directional light for the reconstructed scene
//
// One directional light plus ambient, read off the image's lightness
// statistics. The optimize pass rescales it by image quality.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::ImageAnalysis;

const DEFAULT_DIRECTION: [f64; 2] = [0.0, -1.0];
const DEFAULT_LUMINANCE: f64 = 128.0;
const DEFAULT_SHADOW: f64 = 0.2;
const BASE_AMBIENT: f64 = 0.3;
const AMBIENT_RANGE: (f64, f64) = (0.1, 0.5);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingModel {
    /// Unit vector the light travels along.
    pub direction: Vector3<f64>,
    pub intensity: f64,
    pub ambient: f64,
    pub shadow_strength: f64,
}

impl Default for LightingModel {
    fn default() -> Self {
        derive_lighting(&ImageAnalysis::default())
    }
}

/// Light from the analysis' lighting summary, or neutral defaults when the
/// summary is missing.
pub fn derive_lighting(analysis: &ImageAnalysis) -> LightingModel {
    let (dir2, luminance, shadow) = match &analysis.lighting {
        Some(l) => (l.light_direction, l.mean_luminance, l.shadow_ratio),
        None => (DEFAULT_DIRECTION, DEFAULT_LUMINANCE, DEFAULT_SHADOW),
    };
    let raw = Vector3::new(dir2[0], -1.0, dir2[1]);
    let direction = raw.try_normalize(1e-12).unwrap_or_else(|| -Vector3::y());
    let intensity = (luminance / 255.0).clamp(0.0, 1.0);

    let model = LightingModel {
        direction,
        intensity: if intensity.is_finite() { intensity } else { DEFAULT_LUMINANCE / 255.0 },
        ambient: BASE_AMBIENT,
        shadow_strength: if shadow.is_finite() { shadow } else { DEFAULT_SHADOW },
    };
    debug!(
        direction = ?model.direction,
        intensity = model.intensity,
        shadow = model.shadow_strength,
        "Derived lighting"
    );
    model
}

/// Scale intensity and ambient by image quality. Not idempotent: every call
/// compounds on the previous values.
pub fn optimize(lighting: &mut LightingModel, analysis: &ImageAnalysis) {
    let q = analysis.quality_score();
    lighting.intensity = (lighting.intensity * (0.5 + 0.5 * q)).min(1.0);
    lighting.ambient = (lighting.ambient * q).clamp(AMBIENT_RANGE.0, AMBIENT_RANGE.1);
    debug!(quality = q, intensity = lighting.intensity, ambient = lighting.ambient, "Optimized lighting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{LightingSummary, QualityMetrics};
    use approx::assert_relative_eq;

    fn analysis_with(lum: f64, dir: [f64; 2], quality: Option<f64>) -> ImageAnalysis {
        ImageAnalysis {
            lighting: Some(LightingSummary {
                mean_luminance: lum,
                luminance_spread: 10.0,
                shadow_ratio: 0.35,
                highlight_ratio: 0.05,
                light_direction: dir,
            }),
            quality: quality.map(|q| QualityMetrics {
                sharpness: 0.0,
                brightness: 0.0,
                contrast: 0.0,
                noise_level: 0.0,
                quality_score: q,
            }),
            ..ImageAnalysis::default()
        }
    }

    #[test]
    fn defaults_without_summary() {
        let l = derive_lighting(&ImageAnalysis::default());
        assert_relative_eq!(l.direction, -Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(l.intensity, 128.0 / 255.0);
        assert_relative_eq!(l.ambient, 0.3);
        assert_relative_eq!(l.shadow_strength, 0.2);
    }

    #[test]
    fn direction_is_unit_and_follows_gradient() {
        let l = derive_lighting(&analysis_with(255.0, [3.0, 4.0], None));
        assert_relative_eq!(l.direction.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(l.direction, Vector3::new(3.0, -1.0, 4.0).normalize(), epsilon = 1e-12);
        assert_relative_eq!(l.intensity, 1.0);
        assert_relative_eq!(l.shadow_strength, 0.35);
    }

    #[test]
    fn optimize_scales_by_quality() {
        let a = analysis_with(204.0, [0.0, 0.0], Some(0.8));
        let mut l = derive_lighting(&a);
        optimize(&mut l, &a);
        assert_relative_eq!(l.intensity, 0.8 * 0.9, epsilon = 1e-12);
        assert_relative_eq!(l.ambient, 0.24, epsilon = 1e-12);
    }

    #[test]
    fn optimize_keeps_ambient_in_range() {
        let a = analysis_with(128.0, [0.0, 0.0], Some(0.0));
        let mut l = derive_lighting(&a);
        optimize(&mut l, &a);
        assert_relative_eq!(l.ambient, 0.1);
        assert_relative_eq!(l.intensity, 0.5 * 128.0 / 255.0, epsilon = 1e-12);
    }

    #[test]
    fn optimize_compounds() {
        let a = analysis_with(255.0, [0.0, 0.0], Some(0.5));
        let mut l = derive_lighting(&a);
        optimize(&mut l, &a);
        let once = l.intensity;
        optimize(&mut l, &a);
        assert!(l.intensity < once);
    }
}

// quality.rs - Image quality metrics
//
// Sharpness and noise both come from the variance of the Laplacian: a sharp
// photo has strong high-frequency content, a noisy one too. The score
// rewards sharpness and contrast and penalizes noise and bad exposure.

use serde::{Deserialize, Serialize};

use crate::raster::GrayF32;

const SHARPNESS_SATURATION: f64 = 1000.0;
const CONTRAST_SATURATION: f64 = 50.0;
const NOISE_SATURATION: f64 = 20.0;
const MID_GRAY: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sharpness: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub noise_level: f64,
    pub quality_score: f64,
}

pub fn measure(gray: &GrayF32) -> QualityMetrics {
    let lap_var = gray.laplacian().variance();
    let brightness = gray.mean();
    let contrast = gray.std_dev();

    QualityMetrics {
        sharpness: lap_var,
        brightness,
        contrast,
        noise_level: lap_var,
        quality_score: score(lap_var, contrast, lap_var, brightness),
    }
}

/// Weighted quality score in [0, 1].
pub fn score(sharpness: f64, contrast: f64, noise: f64, brightness: f64) -> f64 {
    let sharp = (sharpness / SHARPNESS_SATURATION).clamp(0.0, 1.0);
    let contr = (contrast / CONTRAST_SATURATION).clamp(0.0, 1.0);
    let clean = (1.0 - (noise / NOISE_SATURATION).min(1.0)).clamp(0.0, 1.0);
    let exposure = (1.0 - (brightness - MID_GRAY).abs() / MID_GRAY).clamp(0.0, 1.0);

    let s = sharp * 0.3 + contr * 0.3 + clean * 0.2 + exposure * 0.2;
    if s.is_finite() { s.min(1.0) } else { 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn flat_mid_gray_scores_clean_and_exposed() {
        let m = measure(&GrayF32::filled(32, 32, 128.0));
        assert_relative_eq!(m.sharpness, 0.0);
        assert_relative_eq!(m.contrast, 0.0);
        // no sharpness, no contrast, no noise, perfect exposure
        assert_relative_eq!(m.quality_score, 0.4);
    }

    #[test]
    fn checkerboard_is_sharp_but_noisy() {
        let img = GrayF32::from_fn(32, 32, |x, y| if (x + y) % 2 == 0 { 0.0 } else { 255.0 });
        let m = measure(&img);
        assert!(m.sharpness > SHARPNESS_SATURATION);
        assert_relative_eq!(m.contrast, 127.5, epsilon = 1e-6);
        assert_relative_eq!(m.quality_score, 0.3 + 0.3 + 0.0 + 0.2 * (1.0 - 0.5 / 128.0), epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn score_stays_in_unit_range(
            s in 0.0f64..1e6, c in 0.0f64..1e3, n in 0.0f64..1e6, b in -1e3f64..1e3,
        ) {
            let q = score(s, c, n, b);
            prop_assert!((0.0..=1.0).contains(&q));
        }
    }
}

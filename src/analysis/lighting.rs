// lighting.rs - Lighting conditions from the L*a*b* lightness channel
//
// L* is stored on the 0-255 scale an 8-bit Lab image uses, so the shadow and
// highlight cutoffs (50 / 200) read the same as on any 8-bit Lab raster.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::raster::GrayF32;

const SHADOW_CUTOFF: f32 = 50.0;
const HIGHLIGHT_CUTOFF: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingSummary {
    pub mean_luminance: f64,
    /// Standard deviation of the lightness channel.
    pub luminance_spread: f64,
    pub shadow_ratio: f64,
    pub highlight_ratio: f64,
    /// Mean image-space lightness gradient `(x, y)`.
    pub light_direction: [f64; 2],
}

pub fn measure(img: &RgbImage) -> LightingSummary {
    let l = lightness(img);
    let n = l.len().max(1) as f64;

    let shadows = l.data.iter().filter(|&&v| v < SHADOW_CUTOFF).count() as f64;
    let highlights = l.data.iter().filter(|&&v| v > HIGHLIGHT_CUTOFF).count() as f64;
    let (gx, gy) = l.sobel();

    LightingSummary {
        mean_luminance: l.mean(),
        luminance_spread: l.std_dev(),
        shadow_ratio: shadows / n,
        highlight_ratio: highlights / n,
        light_direction: [gx.mean(), gy.mean()],
    }
}

/// CIE L* per pixel, scaled from 0-100 to 0-255 and rounded.
pub fn lightness(img: &RgbImage) -> GrayF32 {
    let (w, h) = img.dimensions();
    GrayF32::from_fn(w as usize, h as usize, |x, y| {
        let p = img.get_pixel(x as u32, y as u32);
        let lum = 0.212_671 * srgb_to_linear(p[0])
            + 0.715_160 * srgb_to_linear(p[1])
            + 0.072_169 * srgb_to_linear(p[2]);
        let l_star = if lum > 0.008_856 { 116.0 * lum.cbrt() - 16.0 } else { 903.3 * lum };
        (l_star * 255.0 / 100.0).round().clamp(0.0, 255.0)
    })
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = f32::from(c) / 255.0;
    if c <= 0.040_45 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

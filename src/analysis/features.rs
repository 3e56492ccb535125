// features.rs - Corner, edge and line statistics
//
// Harris corners, Canny edges and a standard Hough line transform over the
// edge map. Only the counts are kept; they describe how much structure the
// reconstruction has to work with.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::raster::GrayF32;

const HARRIS_K: f32 = 0.04;
const HARRIS_REL_THRESHOLD: f32 = 0.01;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const HOUGH_VOTES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub corner_count: usize,
    pub edge_density: f64,
    pub line_count: usize,
}

pub fn measure(gray: &GrayF32) -> FeatureSummary {
    let corner_count = harris_corner_count(gray);
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let edge_count = edges.iter().filter(|&&e| e).count();
    let edge_density = edge_count as f64 / edges.len().max(1) as f64;
    let line_count = hough_line_count(&edges, gray.w, gray.h, HOUGH_VOTES);

    FeatureSummary { corner_count, edge_density, line_count }
}

// ============================================================================
// Harris
// ============================================================================

/// Pixels whose Harris response exceeds 1% of the strongest response.
pub fn harris_corner_count(gray: &GrayF32) -> usize {
    let r = harris_response(gray);
    let Some((_, max)) = r.min_max() else { return 0 };
    let threshold = HARRIS_REL_THRESHOLD * max;
    r.data.iter().filter(|&&v| v > threshold).count()
}

/// Harris response with a 2x2 structure-tensor window.
pub fn harris_response(gray: &GrayF32) -> GrayF32 {
    let (gx, gy) = gray.sobel();
    // keep magnitudes comparable to an 8-bit source
    let scale = 1.0 / (4.0 * 2.0 * 255.0);
    let ixx = GrayF32::from_fn(gray.w, gray.h, |x, y| (gx.get(x, y) * scale).powi(2));
    let iyy = GrayF32::from_fn(gray.w, gray.h, |x, y| (gy.get(x, y) * scale).powi(2));
    let ixy = GrayF32::from_fn(gray.w, gray.h, |x, y| gx.get(x, y) * gy.get(x, y) * scale * scale);

    GrayF32::from_fn(gray.w, gray.h, |x, y| {
        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        for dy in 0..2 {
            for dx in 0..2 {
                let sx = x.saturating_sub(dx);
                let sy = y.saturating_sub(dy);
                a += ixx.get(sx, sy);
                b += ixy.get(sx, sy);
                c += iyy.get(sx, sy);
            }
        }
        let det = a * c - b * b;
        let trace = a + c;
        det - HARRIS_K * trace * trace
    })
}

// ============================================================================
// Canny
// ============================================================================

/// Binary edge map from non-maximum suppression and hysteresis.
pub fn canny(gray: &GrayF32, low: f32, high: f32) -> Vec<bool> {
    let (w, h) = (gray.w, gray.h);
    if w < 3 || h < 3 {
        return vec![false; w * h];
    }
    let (gx, gy) = gray.sobel();
    let mag: Vec<f32> = gx.data.iter().zip(&gy.data).map(|(a, b)| a.abs() + b.abs()).collect();

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut class = vec![0u8; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (dx, dy) = (gx.data[i], gy.data[i]);
            let angle = dy.atan2(dx).to_degrees().rem_euclid(180.0);
            let (n1, n2) = if !(22.5..157.5).contains(&angle) {
                (mag[i - 1], mag[i + 1])
            } else if angle < 67.5 {
                (mag[i - w - 1], mag[i + w + 1])
            } else if angle < 112.5 {
                (mag[i - w], mag[i + w])
            } else {
                (mag[i - w + 1], mag[i + w - 1])
            };
            if m > n1 && m >= n2 {
                class[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = (0..w * h).filter(|&i| class[i] == 2).collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if class[j] == 1 && !edges[j] {
                    edges[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    edges
}

// ============================================================================
// Hough
// ============================================================================

/// Number of (rho, theta) accumulator peaks with at least `votes` votes,
/// at 1 px / 1 degree resolution.
pub fn hough_line_count(edges: &[bool], w: usize, h: usize, votes: u32) -> usize {
    const THETAS: usize = 180;
    let max_rho = ((w * w + h * h) as f64).sqrt().ceil() as isize;
    let rhos = (2 * max_rho + 1) as usize;
    let trig: Vec<(f64, f64)> = (0..THETAS)
        .map(|t| {
            let th = t as f64 * PI / THETAS as f64;
            (th.cos(), th.sin())
        })
        .collect();

    let mut acc = vec![0u32; THETAS * rhos];
    for y in 0..h {
        for x in 0..w {
            if !edges[y * w + x] {
                continue;
            }
            for (t, &(c, s)) in trig.iter().enumerate() {
                let rho = (x as f64 * c + y as f64 * s).round() as isize + max_rho;
                acc[t * rhos + rho as usize] += 1;
            }
        }
    }

    let at = |t: usize, r: usize| acc[t * rhos + r];
    let mut count = 0;
    for t in 0..THETAS {
        for r in 0..rhos {
            let v = at(t, r);
            if v < votes {
                continue;
            }
            let left = if r > 0 { at(t, r - 1) } else { 0 };
            let right = if r + 1 < rhos { at(t, r + 1) } else { 0 };
            let up = if t > 0 { at(t - 1, r) } else { 0 };
            let down = if t + 1 < THETAS { at(t + 1, r) } else { 0 };
            if v > left && v >= right && v > up && v >= down {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_has_no_features() {
        let f = measure(&GrayF32::filled(64, 64, 100.0));
        assert_eq!(f.corner_count, 0);
        assert_eq!(f.edge_density, 0.0);
        assert_eq!(f.line_count, 0);
    }

    #[test]
    fn vertical_step_gives_edges_and_a_line() {
        let img = GrayF32::from_fn(160, 160, |x, _| if x < 80 { 20.0 } else { 230.0 });
        let edges = canny(&img, CANNY_LOW, CANNY_HIGH);
        let column: usize = (1..159).filter(|&y| edges[y * 160 + 79] || edges[y * 160 + 80]).count();
        assert_eq!(column, 158);
        assert!(hough_line_count(&edges, 160, 160, HOUGH_VOTES) >= 1);
    }

    #[test]
    fn square_has_corners() {
        let img = GrayF32::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) { 255.0 } else { 0.0 }
        });
        assert!(harris_corner_count(&img) >= 4);
    }
}

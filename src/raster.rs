// raster.rs - Single-channel float rasters and the filters the pipeline needs
//
// Convolutions clamp at the border. Values are kept on whatever scale the
// caller fed in (0-255 for image intensities, 0-1 for depth).

use image::RgbImage;

type Kernel3 = [[f32; 3]; 3];

const SOBEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];
const LAPLACIAN: Kernel3 = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Row-major f32 raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl GrayF32 {
    pub fn new(w: usize, h: usize) -> Self {
        Self { w, h, data: vec![0.0; w * h] }
    }

    pub fn filled(w: usize, h: usize, value: f32) -> Self {
        Self { w, h, data: vec![value; w * h] }
    }

    pub fn from_fn(w: usize, h: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        Self { w, h, data }
    }

    /// Grayscale intensity (0-255) with the ITU-R 601 weights.
    pub fn luma_from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self::from_fn(w as usize, h as usize, |x, y| {
            let p = img.get_pixel(x as u32, y as u32);
            luma(p[0], p[1], p[2])
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.w + x] = v;
    }

    #[inline]
    fn clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.w as isize - 1) as usize;
        let cy = y.clamp(0, self.h as isize - 1) as usize;
        self.get(cx, cy)
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        if self.data.is_empty() {
            return None;
        }
        Some(
            self.data
                .iter()
                .fold((f32::MAX, f32::MIN), |(mn, mx), &v| (mn.min(v), mx.max(v))),
        )
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / self.data.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        self.data
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / self.data.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    fn convolve3(&self, k: &Kernel3) -> GrayF32 {
        let mut out = GrayF32::new(self.w, self.h);
        if self.is_empty() {
            return out;
        }
        for y in 0..self.h {
            for x in 0..self.w {
                let mut sum = 0.0;
                for (ky, row) in k.iter().enumerate() {
                    for (kx, &kv) in row.iter().enumerate() {
                        if kv != 0.0 {
                            let sx = x as isize + kx as isize - 1;
                            let sy = y as isize + ky as isize - 1;
                            sum += self.clamped(sx, sy) * kv;
                        }
                    }
                }
                out.set(x, y, sum);
            }
        }
        out
    }

    /// 3x3 Sobel derivatives `(gx, gy)`.
    pub fn sobel(&self) -> (GrayF32, GrayF32) {
        (self.convolve3(&SOBEL_X), self.convolve3(&SOBEL_Y))
    }

    /// Per-pixel `sqrt(gx^2 + gy^2)` of the Sobel derivatives.
    pub fn sobel_magnitude(&self) -> GrayF32 {
        let (gx, gy) = self.sobel();
        let data = gx
            .data
            .iter()
            .zip(&gy.data)
            .map(|(&a, &b)| (a * a + b * b).sqrt())
            .collect();
        GrayF32 { w: self.w, h: self.h, data }
    }

    /// 4-neighbour Laplacian.
    pub fn laplacian(&self) -> GrayF32 {
        self.convolve3(&LAPLACIAN)
    }

    /// Separable Gaussian blur. A non-positive sigma derives one from the
    /// kernel size the usual way: `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
    pub fn gaussian_blur(&self, ksize: usize, sigma: f32) -> GrayF32 {
        let ksize = ksize.max(1) | 1;
        let sigma = if sigma > 0.0 {
            sigma
        } else {
            0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
        };
        let r = (ksize / 2) as isize;
        let mut kernel: Vec<f32> = (-r..=r)
            .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
            .collect();
        let total: f32 = kernel.iter().sum();
        kernel.iter_mut().for_each(|k| *k /= total);

        let mut tmp = GrayF32::new(self.w, self.h);
        for y in 0..self.h {
            for x in 0..self.w {
                let v = kernel
                    .iter()
                    .enumerate()
                    .map(|(i, &k)| k * self.clamped(x as isize + i as isize - r, y as isize))
                    .sum();
                tmp.set(x, y, v);
            }
        }
        let mut out = GrayF32::new(self.w, self.h);
        for y in 0..self.h {
            for x in 0..self.w {
                let v = kernel
                    .iter()
                    .enumerate()
                    .map(|(i, &k)| k * tmp.clamped(x as isize, y as isize + i as isize - r))
                    .sum();
                out.set(x, y, v);
            }
        }
        out
    }

    /// Edge-preserving bilateral filter over a square window of `diameter`.
    pub fn bilateral(&self, diameter: usize, sigma_color: f32, sigma_space: f32) -> GrayF32 {
        let r = (diameter / 2).max(1) as isize;
        let color_coeff = -0.5 / (sigma_color * sigma_color);
        let space_coeff = -0.5 / (sigma_space * sigma_space);

        let mut spatial = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                let d2 = (dx * dx + dy * dy) as f32;
                // circular window
                if d2 > (r * r) as f32 {
                    continue;
                }
                spatial.push((dx, dy, (d2 * space_coeff).exp()));
            }
        }

        let mut out = GrayF32::new(self.w, self.h);
        for y in 0..self.h {
            for x in 0..self.w {
                let center = self.get(x, y);
                let mut acc = 0.0;
                let mut wsum = 0.0;
                for &(dx, dy, ws) in &spatial {
                    let v = self.clamped(x as isize + dx, y as isize + dy);
                    let dc = v - center;
                    let w = ws * (dc * dc * color_coeff).exp();
                    acc += v * w;
                    wsum += w;
                }
                out.set(x, y, if wsum > 0.0 { acc / wsum } else { center });
            }
        }
        out
    }

    /// Fill masked pixels from the outside in, each new value a
    /// distance-weighted mean of already known pixels within `radius`.
    ///
    /// Pixels that can never be reached (every pixel masked) are left at
    /// their original value.
    pub fn inpaint(&self, mask: &[bool], radius: usize) -> GrayF32 {
        let mut out = self.clone();
        if mask.len() != self.data.len() {
            return out;
        }
        let mut known: Vec<bool> = mask.iter().map(|&m| !m).collect();
        let r = radius.max(1) as isize;

        loop {
            let mut front = Vec::new();
            for y in 0..self.h {
                for x in 0..self.w {
                    let idx = y * self.w + x;
                    if known[idx] {
                        continue;
                    }
                    let mut acc = 0.0;
                    let mut wsum = 0.0;
                    for dy in -r..=r {
                        for dx in -r..=r {
                            let sx = x as isize + dx;
                            let sy = y as isize + dy;
                            if sx < 0 || sy < 0 || sx >= self.w as isize || sy >= self.h as isize {
                                continue;
                            }
                            let sidx = sy as usize * self.w + sx as usize;
                            if !known[sidx] {
                                continue;
                            }
                            let w = 1.0 / ((dx * dx + dy * dy) as f32).sqrt();
                            acc += out.data[sidx] * w;
                            wsum += w;
                        }
                    }
                    if wsum > 0.0 {
                        front.push((idx, acc / wsum));
                    }
                }
            }
            if front.is_empty() {
                break;
            }
            for (idx, v) in front {
                out.data[idx] = v;
                known[idx] = true;
            }
        }
        out
    }

    /// Bilinear resample to `tw x th`.
    pub fn resize_bilinear(&self, tw: usize, th: usize) -> GrayF32 {
        if self.is_empty() || tw == 0 || th == 0 {
            return GrayF32::new(tw, th);
        }
        let (sx, sy) = (self.w as f32 / tw as f32, self.h as f32 / th as f32);
        GrayF32::from_fn(tw, th, |x, y| {
            let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
            let (x0, y0) = ((fx as usize).min(self.w - 1), (fy as usize).min(self.h - 1));
            let (x1, y1) = ((x0 + 1).min(self.w - 1), (y0 + 1).min(self.h - 1));
            let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

            self.get(x0, y0) * (1.0 - tx) * (1.0 - ty)
                + self.get(x1, y0) * tx * (1.0 - ty)
                + self.get(x0, y1) * (1.0 - tx) * ty
                + self.get(x1, y1) * tx * ty
        })
    }
}

#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sobel_of_constant_is_zero() {
        let img = GrayF32::filled(8, 6, 42.0);
        let (gx, gy) = img.sobel();
        assert!(gx.data.iter().all(|&v| v == 0.0));
        assert!(gy.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sobel_detects_horizontal_ramp() {
        let img = GrayF32::from_fn(10, 10, |x, _| x as f32);
        let (gx, gy) = img.sobel();
        // interior pixels see a slope of 1 per pixel, kernel gain 8
        assert_relative_eq!(gx.get(5, 5), 8.0);
        assert_relative_eq!(gy.get(5, 5), 0.0);
    }

    #[test]
    fn laplacian_variance_of_flat_image_is_zero() {
        let img = GrayF32::filled(16, 16, 128.0);
        assert_relative_eq!(img.laplacian().variance(), 0.0);
    }

    #[test]
    fn gaussian_preserves_mean_of_constant() {
        let img = GrayF32::filled(9, 9, 3.0);
        let blurred = img.gaussian_blur(5, 0.0);
        for v in blurred.data {
            assert_relative_eq!(v, 3.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn bilateral_keeps_step_edge() {
        let img = GrayF32::from_fn(20, 4, |x, _| if x < 10 { 0.0 } else { 255.0 });
        let out = img.bilateral(9, 75.0, 75.0);
        assert!(out.get(2, 2) < 5.0);
        assert!(out.get(17, 2) > 250.0);
    }

    #[test]
    fn inpaint_fills_hole_from_neighbours() {
        let mut img = GrayF32::filled(5, 5, 10.0);
        img.set(2, 2, 0.0);
        let mut mask = vec![false; 25];
        mask[12] = true;
        let out = img.inpaint(&mask, 3);
        assert_relative_eq!(out.get(2, 2), 10.0, epsilon = 1e-5);
    }

    #[test]
    fn inpaint_with_everything_masked_is_identity() {
        let img = GrayF32::filled(3, 3, 1.0);
        let out = img.inpaint(&[true; 9], 3);
        assert_eq!(out, img);
    }

    #[test]
    fn resize_bilinear_constant() {
        let img = GrayF32::filled(4, 4, 0.5);
        let out = img.resize_bilinear(9, 7);
        assert_eq!((out.w, out.h), (9, 7));
        assert!(out.data.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn luma_weights_sum_to_white() {
        assert_relative_eq!(luma(255, 255, 255), 255.0, epsilon = 1e-3);
    }
}

// cloud/mod.rs - Pinhole lifting of a depth map into a colored point cloud
//
// z = depth * depth_scale, x = (u - cx) z / fx, y = (v - cy) z / fy.
// Points whose z falls outside the profile's open range are dropped.

use image::RgbImage;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::depth::DepthMap;

/// Fraction of the image width used as focal length when none is known.
const DEFAULT_FOCAL_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraParams {
    pub fn default_for(width: usize, height: usize) -> Self {
        let f = width as f64 * DEFAULT_FOCAL_FRACTION;
        Self { fx: f, fy: f, cx: width as f64 / 2.0, cy: height as f64 / 2.0 }
    }

    /// Square pixels with the given focal length, principal point centered.
    pub fn with_focal(focal: f64, width: usize, height: usize) -> Self {
        Self { fx: focal, fy: focal, ..Self::default_for(width, height) }
    }
}

/// How normalized depth maps to scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthProfile {
    pub depth_scale: f64,
    /// Exclusive lower bound on z.
    pub z_min: f64,
    /// Exclusive upper bound on z.
    pub z_max: f64,
}

impl DepthProfile {
    /// Lifting straight from the depth estimator.
    pub fn direct() -> Self {
        Self { depth_scale: 10.0, z_min: 0.0, z_max: 100.0 }
    }

    /// Lifting for scene reconstruction.
    pub fn scene() -> Self {
        Self { depth_scale: 5.0, z_min: 0.1, z_max: 20.0 }
    }

    pub fn accepts(&self, z: f64) -> bool {
        z > self.z_min && z < self.z_max
    }
}

impl Default for DepthProfile {
    fn default() -> Self {
        Self::direct()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub colors: Vec<[u8; 3]>,
}

impl PointCloud {
    pub fn with_capacity(n: usize) -> Self {
        Self { points: Vec::with_capacity(n), colors: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, p: Point3<f64>, color: [u8; 3]) {
        self.points.push(p);
        self.colors.push(color);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only the points at `indices`, in that order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            colors: indices.iter().map(|&i| self.colors[i]).collect(),
        }
    }
}

pub fn project(
    img: &RgbImage,
    depth: &DepthMap,
    camera: Option<&CameraParams>,
    profile: &DepthProfile,
) -> PointCloud {
    let (w, h) = (depth.width(), depth.height());
    let cam = camera.copied().unwrap_or_else(|| CameraParams::default_for(w, h));
    let (iw, ih) = img.dimensions();
    let same_size = iw as usize == w && ih as usize == h;

    let mut cloud = PointCloud::with_capacity(w * h);
    if iw == 0 || ih == 0 {
        return cloud;
    }
    for v in 0..h {
        for u in 0..w {
            let z = f64::from(depth.get(u, v)) * profile.depth_scale;
            if !profile.accepts(z) {
                continue;
            }
            let x = (u as f64 - cam.cx) * z / cam.fx;
            let y = (v as f64 - cam.cy) * z / cam.fy;

            let (px, py) = if same_size {
                (u as u32, v as u32)
            } else {
                // nearest source pixel
                let px = ((u as f64 + 0.5) * f64::from(iw) / w as f64) as u32;
                let py = ((v as f64 + 0.5) * f64::from(ih) / h as f64) as u32;
                (px.min(iw - 1), py.min(ih - 1))
            };
            cloud.push(Point3::new(x, y, z), img.get_pixel(px, py).0);
        }
    }

    debug!(points = cloud.len(), pixels = w * h, scale = profile.depth_scale, "Projected point cloud");
    cloud
}

// surface.rs - Derived geometry from a depth map
//
// Normals and discontinuities both come from Sobel derivatives of depth.

use nalgebra::Vector3;

use super::DepthMap;

/// Per-pixel unit normal `normalize(-dz/dx, -dz/dy, 1)`, row-major.
pub fn surface_normals(depth: &DepthMap) -> Vec<Vector3<f32>> {
    let (gx, gy) = depth.raster().sobel();
    gx.data
        .iter()
        .zip(&gy.data)
        .map(|(&dx, &dy)| {
            // length is at least 1, never degenerate
            Vector3::new(-dx, -dy, 1.0).normalize()
        })
        .collect()
}

/// 0/1 mask of pixels whose depth gradient magnitude exceeds `threshold`.
pub fn discontinuities(depth: &DepthMap, threshold: f32) -> Vec<u8> {
    depth
        .raster()
        .sobel_magnitude()
        .data
        .iter()
        .map(|&m| u8::from(m > threshold))
        .collect()
}

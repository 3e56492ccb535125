// quadric.rs - Quadric error metric
//
// Q = sum of p p^T over the planes p = (a, b, c, d) around a vertex; the
// error of placing the vertex at v is [v 1]^T Q [v 1].

use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(Matrix4<f64>);

impl Default for Quadric {
    fn default() -> Self {
        Self(Matrix4::zeros())
    }
}

impl Quadric {
    /// Plane through `p` with unit normal `n`.
    pub fn from_plane(n: &Vector3<f64>, p: &Point3<f64>) -> Self {
        let plane = Vector4::new(n.x, n.y, n.z, -n.dot(&p.coords));
        Self(plane * plane.transpose())
    }

    #[must_use]
    pub fn scaled(self, w: f64) -> Self {
        Self(self.0 * w)
    }

    pub fn error(&self, v: &Point3<f64>) -> f64 {
        let h = v.to_homogeneous();
        (h.transpose() * self.0 * h)[(0, 0)]
    }

    /// Position minimizing the error, if the system is well conditioned.
    pub fn optimal_point(&self) -> Option<Point3<f64>> {
        let a: Matrix3<f64> = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        if a.determinant().abs() < 1e-10 {
            return None;
        }
        let b: Vector3<f64> = -self.0.fixed_view::<3, 1>(0, 3).into_owned();
        a.try_inverse().map(|inv| Point3::from(inv * b))
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

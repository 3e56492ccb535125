// normals.rs - PCA normal estimation for lifted point clouds
//
// The normal of each point is the eigenvector with the smallest eigenvalue
// of its neighbourhood covariance, flipped to face the camera (-Z).

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

use super::index::PointIndex;

pub fn estimate_normals(points: &[Point3<f64>], index: &PointIndex, k: usize) -> Vec<Vector3<f64>> {
    points
        .iter()
        .map(|p| {
            let n = pca_normal(p, index, points, k);
            if n.z > 0.0 { -n } else { n }
        })
        .collect()
}

fn pca_normal(point: &Point3<f64>, index: &PointIndex, points: &[Point3<f64>], k: usize) -> Vector3<f64> {
    let neighbors = index.nearest_n(point, k);
    if neighbors.len() < 3 {
        return -Vector3::z();
    }

    let centroid: Vector3<f64> =
        neighbors.iter().map(|&i| points[i].coords).sum::<Vector3<f64>>() / neighbors.len() as f64;

    let mut cov = Matrix3::zeros();
    for &i in &neighbors {
        let d = points[i].coords - centroid;
        cov += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(cov);
    let ev = eigen.eigenvalues;
    let min_idx = if ev[0] <= ev[1] && ev[0] <= ev[2] {
        0
    } else if ev[1] <= ev[2] {
        1
    } else {
        2
    };

    let normal: Vector3<f64> = eigen.eigenvectors.column(min_idx).into_owned();
    normal.try_normalize(1e-10).unwrap_or_else(|| -Vector3::z())
}

// surface/mod.rs - Point cloud to triangle mesh
//
// Primary path: PCA normals over a k-d tree, implicit surface on a regular
// grid, quadric decimation when the result is too dense. When that fails
// the cloud is subsampled and triangulated in XY, and failing that laid
// out as a raster grid. The result is always a valid mesh.

pub mod decimate;
pub mod delaunay;
pub mod grid;
pub mod implicit;
pub mod index;
pub mod normals;
pub mod quadric;

use nalgebra::Point3;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cloud::PointCloud;
use crate::error::{ReconstructError, ReconstructResult};
use crate::mesh::{Mesh, MeshBuilder, NEUTRAL_GRAY};
use crate::outcome::Outcome;
use index::PointIndex;

/// Fewest points the implicit path will attempt.
const MIN_SURFACE_POINTS: usize = 16;
/// Gap between the lowest vertex and the background plane.
const BACKGROUND_DROP: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    /// Neighbours used for each normal fit.
    pub normal_neighbors: usize,
    /// Grid cells along the longest axis of the cloud.
    pub grid_resolution: usize,
    /// Decimate when the surface has more faces than this...
    pub decimate_trigger: usize,
    /// ...down to this many.
    pub decimate_target: usize,
    /// Points kept for the triangulation fallbacks.
    pub fallback_sample_limit: usize,
    /// Points kept for the implicit path.
    pub max_primary_points: usize,
    pub seed: u64,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            normal_neighbors: 30,
            grid_resolution: 96,
            decimate_trigger: 50_000,
            decimate_target: 25_000,
            fallback_sample_limit: 10_000,
            max_primary_points: 200_000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SurfaceReconstructor {
    params: SurfaceParams,
}

impl SurfaceReconstructor {
    pub fn new(params: SurfaceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Build a mesh from `cloud`, degrading through the fallbacks.
    pub fn reconstruct(&self, cloud: &PointCloud) -> Outcome<Mesh> {
        match self.implicit_surface(cloud) {
            Ok(mesh) => {
                info!(
                    points = cloud.len(),
                    vertices = mesh.vertex_count(),
                    faces = mesh.face_count(),
                    "Reconstructed implicit surface"
                );
                Outcome::Full(mesh)
            }
            Err(e) => {
                warn!(error = %e, points = cloud.len(), "Implicit surface failed, triangulating instead");
                self.fallback(cloud, &e.to_string())
            }
        }
    }

    fn implicit_surface(&self, cloud: &PointCloud) -> ReconstructResult<Mesh> {
        if cloud.len() < MIN_SURFACE_POINTS {
            return Err(ReconstructError::TooFewPoints { got: cloud.len(), need: MIN_SURFACE_POINTS });
        }
        let cloud = self.subsample(cloud, self.params.max_primary_points);
        let index = PointIndex::build(&cloud.points);
        let normals = normals::estimate_normals(&cloud.points, &index, self.params.normal_neighbors);
        let mesh = implicit::reconstruct(&cloud.points, &cloud.colors, &normals, &index, self.params.grid_resolution)?;

        if mesh.face_count() > self.params.decimate_trigger {
            let result = decimate::decimate(&mesh, self.params.decimate_target);
            debug!(
                from = result.original_faces,
                to = result.final_faces,
                collapses = result.collapses,
                "Decimated dense surface"
            );
            return Ok(result.mesh);
        }
        Ok(mesh)
    }

    fn fallback(&self, cloud: &PointCloud, reason: &str) -> Outcome<Mesh> {
        let sample = self.subsample(cloud, self.params.fallback_sample_limit);

        match delaunay::triangulate_xy(&sample.points)
            .and_then(|faces| Mesh::from_parts(sample.points.clone(), faces, Some(sample.colors.clone())))
        {
            Ok(mesh) => {
                debug!(faces = mesh.face_count(), "Delaunay fallback");
                return Outcome::degraded(mesh, format!("{reason}; used Delaunay triangulation"));
            }
            Err(e) => warn!(error = %e, "Delaunay fallback failed, using grid triangulation"),
        }

        let mesh = Self::grid_fallback(&sample);
        if mesh.face_count() > 0 {
            return Outcome::degraded(mesh, format!("{reason}; used grid triangulation"));
        }
        warn!(points = sample.len(), "No triangulation possible, returning empty mesh");
        Outcome::degraded(Mesh::empty(), format!("{reason}; no surface"))
    }

    /// Triangulate assuming the points form a square raster in row order.
    pub fn grid_fallback(cloud: &PointCloud) -> Mesh {
        let faces = grid::grid_faces(cloud.len());
        if faces.is_empty() {
            return Mesh::empty();
        }
        Mesh::from_parts(cloud.points.clone(), faces, Some(cloud.colors.clone())).unwrap_or_default()
    }

    /// Seeded uniform subsample, order preserved. Clouds at or under
    /// `limit` come back unchanged.
    pub fn subsample(&self, cloud: &PointCloud, limit: usize) -> PointCloud {
        if cloud.len() <= limit {
            return cloud.clone();
        }
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut picked = rand::seq::index::sample(&mut rng, cloud.len(), limit).into_vec();
        picked.sort_unstable();
        debug!(from = cloud.len(), to = limit, "Subsampled point cloud");
        cloud.select(&picked)
    }
}

/// Append a flat gray ground quad under `mesh`. Meshes without vertices
/// are left alone.
pub fn extend_background(mesh: &mut Mesh) -> ReconstructResult<()> {
    let (Some(bounds), Some(center)) = (mesh.bounds(), mesh.centroid()) else {
        return Ok(());
    };
    let extent = bounds.extent();
    let half = extent.x.max(extent.z);
    let y = bounds.min.y - BACKGROUND_DROP;
    let quad = [
        Point3::new(center.x - half, y, center.z - half),
        Point3::new(center.x + half, y, center.z - half),
        Point3::new(center.x + half, y, center.z + half),
        Point3::new(center.x - half, y, center.z + half),
    ];

    let mut b = MeshBuilder::from_mesh(std::mem::take(mesh));
    let result = b.append_with_offset(&quad, &[[0, 1, 2], [0, 2, 3]], Some(NEUTRAL_GRAY));
    *mesh = b.build();
    debug!(ground_y = y, size = 2.0 * half, "Extended background plane");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sheet(n: usize) -> PointCloud {
        let mut cloud = PointCloud::with_capacity(n * n);
        for r in 0..n {
            for c in 0..n {
                let (x, y) = (c as f64 / n as f64, r as f64 / n as f64);
                cloud.push(Point3::new(x, y, 3.0 + 0.3 * x + 0.2 * y), [200, 100, 50]);
            }
        }
        cloud
    }

    fn small_params() -> SurfaceParams {
        SurfaceParams { normal_neighbors: 10, grid_resolution: 12, ..SurfaceParams::default() }
    }

    #[test]
    fn sheet_takes_primary_path() {
        let out = SurfaceReconstructor::new(small_params()).reconstruct(&sheet(30));
        assert!(!out.is_degraded(), "{:?}", out.reason());
        let mesh = out.into_value();
        assert!(mesh.face_count() > 0);
        assert!(mesh.colors().is_some());
    }

    #[test]
    fn dense_surface_is_decimated() {
        let full = SurfaceReconstructor::new(small_params()).reconstruct(&sheet(30)).into_value();
        let params = SurfaceParams { decimate_trigger: 100, decimate_target: 60, ..small_params() };
        let mesh = SurfaceReconstructor::new(params).reconstruct(&sheet(30)).into_value();
        assert!(full.face_count() > 100);
        assert!(mesh.face_count() < full.face_count());
    }

    #[test]
    fn few_points_fall_back_to_delaunay() {
        let mut cloud = PointCloud::default();
        cloud.push(Point3::new(0.0, 0.0, 1.0), [1, 1, 1]);
        cloud.push(Point3::new(1.0, 0.0, 1.0), [2, 2, 2]);
        cloud.push(Point3::new(0.0, 1.0, 1.0), [3, 3, 3]);
        let out = SurfaceReconstructor::default().reconstruct(&cloud);
        assert!(out.is_degraded());
        assert!(out.reason().unwrap().contains("Delaunay"));
        assert_eq!(out.value().face_count(), 1);
    }

    #[test]
    fn collinear_points_fall_back_to_grid() {
        let mut cloud = PointCloud::default();
        for i in 0..4 {
            let t = f64::from(i);
            cloud.push(Point3::new(t, t, 1.0 + t), [9, 9, 9]);
        }
        let out = SurfaceReconstructor::default().reconstruct(&cloud);
        assert!(out.reason().unwrap().contains("grid"));
        assert_eq!(out.value().face_count(), 2);
    }

    #[test]
    fn empty_cloud_gives_empty_mesh() {
        let out = SurfaceReconstructor::default().reconstruct(&PointCloud::default());
        assert!(out.is_degraded());
        assert!(out.value().is_empty());
        assert_eq!(out.value().face_count(), 0);
    }

    #[test]
    fn grid_fallback_on_unit_square() {
        let mut cloud = PointCloud::default();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            cloud.push(Point3::new(x, y, 1.0), [0, 0, 0]);
        }
        let mesh = SurfaceReconstructor::grid_fallback(&cloud);
        assert_eq!(mesh.face_count(), 2);
        let used: std::collections::HashSet<u32> = mesh.faces().iter().flatten().copied().collect();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn subsample_is_seeded_and_ordered() {
        let cloud = sheet(150);
        let r = SurfaceReconstructor::default();
        let a = r.subsample(&cloud, 10_000);
        let b = r.subsample(&cloud, 10_000);
        assert_eq!(a.len(), 10_000);
        assert_eq!(a, b);
        assert!(a.points.windows(2).all(|w| (w[0].y, w[0].x) <= (w[1].y, w[1].x)));
    }

    #[test]
    fn background_adds_quad_below_mesh() {
        let mut mesh = SurfaceReconstructor::grid_fallback(&sheet(4));
        let (v0, f0) = (mesh.vertex_count(), mesh.face_count());
        let min_y = mesh.bounds().unwrap().min.y;
        extend_background(&mut mesh).unwrap();

        assert_eq!(mesh.vertex_count(), v0 + 4);
        assert_eq!(mesh.face_count(), f0 + 2);
        for f in &mesh.faces()[f0..] {
            assert!(f.iter().all(|&i| i as usize >= v0));
        }
        for v in &mesh.vertices()[v0..] {
            assert_relative_eq!(v.y, min_y - 1.0);
        }
        assert_eq!(mesh.colors().unwrap()[v0], NEUTRAL_GRAY);
    }

    #[test]
    fn background_skips_empty_mesh() {
        let mut mesh = Mesh::empty();
        extend_background(&mut mesh).unwrap();
        assert!(mesh.is_empty());
    }
}

// implicit.rs - Implicit surface from oriented points
//
// The signed distance at a grid node is the weighted distance to the
// tangent planes of its nearest oriented samples, left undefined farther
// than a few cells from the data. The zero level set is extracted with
// marching tetrahedra, each cube split into six tetrahedra around its main
// diagonal, so no ambiguous cases arise.

use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use tracing::debug;

use super::index::PointIndex;
use crate::error::{ReconstructError, ReconstructResult};
use crate::mesh::{Aabb, Mesh, MeshBuilder};

/// Samples blended into each signed distance.
const BLEND_NEIGHBORS: usize = 4;
/// Nodes farther than this many cell diagonals from the data stay undefined.
const TRUNCATION_CELLS: f64 = 2.0;

// cube corner offsets, then the six tetrahedra sharing diagonal 0-6
const CORNERS: [[usize; 3]; 8] =
    [[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0], [0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]];
const TETS: [[usize; 4]; 6] = [[0, 5, 1, 6], [0, 1, 2, 6], [0, 2, 3, 6], [0, 3, 7, 6], [0, 7, 4, 6], [0, 4, 5, 6]];

struct Grid {
    origin: Point3<f64>,
    cell: f64,
    dims: [usize; 3],
    values: Vec<f64>,
}

impl Grid {
    fn id(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    fn position(&self, id: usize) -> Point3<f64> {
        let x = id % self.dims[0];
        let y = (id / self.dims[0]) % self.dims[1];
        let z = id / (self.dims[0] * self.dims[1]);
        self.origin + Vector3::new(x as f64, y as f64, z as f64) * self.cell
    }
}

/// Extract a colored surface mesh from `points` with unit `normals`.
/// `resolution` is the number of cells along the longest axis.
pub fn reconstruct(
    points: &[Point3<f64>],
    colors: &[[u8; 3]],
    normals: &[Vector3<f64>],
    index: &PointIndex,
    resolution: usize,
) -> ReconstructResult<Mesh> {
    let bounds = Aabb::from_points(points).ok_or(ReconstructError::TooFewPoints { got: 0, need: 1 })?;
    let extent = bounds.extent();
    let longest = extent.amax();
    if !(longest > 1e-9) || !longest.is_finite() {
        return Err(ReconstructError::DegenerateExtent);
    }

    let cell = longest / resolution.max(1) as f64;
    let dims = [0, 1, 2].map(|a| (extent[a] / cell).ceil() as usize + 3);
    let origin = bounds.min - Vector3::repeat(cell);
    let mut grid = Grid { origin, cell, dims, values: Vec::new() };
    let truncation = TRUNCATION_CELLS * cell * 3f64.sqrt();

    let total = dims[0] * dims[1] * dims[2];
    grid.values = (0..total)
        .map(|id| signed_distance(&grid.position(id), points, normals, index, truncation))
        .collect();
    let defined = grid.values.iter().filter(|v| !v.is_nan()).count();
    debug!(?dims, cell, defined, "Sampled signed distance grid");

    let mesh = march(&grid, colors, index)?;
    if mesh.face_count() == 0 {
        return Err(ReconstructError::EmptySurface);
    }
    Ok(mesh)
}

fn signed_distance(
    x: &Point3<f64>,
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    index: &PointIndex,
    truncation: f64,
) -> f64 {
    let near = index.nearest_n(x, BLEND_NEIGHBORS);
    let Some(&first) = near.first() else { return f64::NAN };
    if (x - points[first]).norm() > truncation {
        return f64::NAN;
    }

    let sigma2 = (truncation * 0.5).powi(2);
    let (mut acc, mut wsum) = (0.0, 0.0);
    for i in near {
        let d = x - points[i];
        let w = (-d.norm_squared() / sigma2).exp();
        acc += w * normals[i].dot(&d);
        wsum += w;
    }
    if wsum > 0.0 { acc / wsum } else { normals[first].dot(&(x - points[first])) }
}

fn march(grid: &Grid, colors: &[[u8; 3]], index: &PointIndex) -> ReconstructResult<Mesh> {
    let mut b = MeshBuilder::new(true);
    let mut edge_vertex: HashMap<(usize, usize), u32> = HashMap::new();
    let [nx, ny, nz] = grid.dims;

    let mut vertex_on = |b: &mut MeshBuilder, a: usize, c: usize| -> u32 {
        let (va, vc) = (grid.values[a], grid.values[c]);
        let t = (va / (va - vc)).clamp(0.0, 1.0);
        let key = if t <= 1e-9 {
            (a, a)
        } else if t >= 1.0 - 1e-9 {
            (c, c)
        } else {
            (a.min(c), a.max(c))
        };
        *edge_vertex.entry(key).or_insert_with(|| {
            let (pa, pc) = (grid.position(a), grid.position(c));
            let p = pa + (pc - pa) * t;
            let color = index.nearest(&p).map(|(i, _)| colors[i]);
            b.vertex(p, color)
        })
    };

    for z in 0..nz - 1 {
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let ids = CORNERS.map(|[dx, dy, dz]| grid.id(x + dx, y + dy, z + dz));
                if ids.iter().any(|&id| grid.values[id].is_nan()) {
                    continue;
                }
                for tet in TETS {
                    let t = tet.map(|c| ids[c]);
                    let (inside, outside): (Vec<usize>, Vec<usize>) =
                        t.iter().partition(|&&id| grid.values[id] < 0.0);
                    let tris: Vec<[u32; 3]> = match (inside.len(), outside.len()) {
                        (1, 3) | (3, 1) => {
                            let (lone, rest) =
                                if inside.len() == 1 { (inside[0], &outside) } else { (outside[0], &inside) };
                            vec![[
                                vertex_on(&mut b, lone, rest[0]),
                                vertex_on(&mut b, lone, rest[1]),
                                vertex_on(&mut b, lone, rest[2]),
                            ]]
                        }
                        (2, 2) => {
                            let (i0, i1, o0, o1) = (inside[0], inside[1], outside[0], outside[1]);
                            let a = vertex_on(&mut b, i0, o0);
                            let c = vertex_on(&mut b, i0, o1);
                            let d = vertex_on(&mut b, i1, o1);
                            let e = vertex_on(&mut b, i1, o0);
                            vec![[a, c, d], [a, d, e]]
                        }
                        _ => Vec::new(),
                    };
                    if tris.is_empty() {
                        continue;
                    }

                    // face along the gradient, from inside to outside
                    let centroid = |ids: &[usize]| {
                        ids.iter().map(|&id| grid.position(id).coords).sum::<Vector3<f64>>() / ids.len() as f64
                    };
                    let uphill = centroid(&outside) - centroid(&inside);
                    for [p, q, r] in tris {
                        if p == q || q == r || p == r {
                            continue;
                        }
                        let (vp, vq, vr) = (b.position(p), b.position(q), b.position(r));
                        let n = (vq - vp).cross(&(vr - vp));
                        if n.norm_squared() < 1e-24 * grid.cell.powi(4) {
                            continue;
                        }
                        let face = if n.dot(&uphill) >= 0.0 { [p, q, r] } else { [p, r, q] };
                        b.face(face)?;
                    }
                }
            }
        }
    }

    debug!(vertices = b.vertex_count(), "Marched iso-surface");
    Ok(b.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::normals::estimate_normals;

    fn plane_cloud(n: usize, z: impl Fn(f64, f64) -> f64) -> (Vec<Point3<f64>>, Vec<[u8; 3]>) {
        let pts: Vec<_> = (0..n)
            .flat_map(|r| {
                let z = &z;
                (0..n).map(move |c| {
                    let (x, y) = (c as f64 / n as f64, r as f64 / n as f64);
                    Point3::new(x, y, z(x, y))
                })
            })
            .collect();
        let colors = vec![[10, 20, 30]; pts.len()];
        (pts, colors)
    }

    #[test]
    fn tilted_plane_becomes_sheet_facing_camera() {
        let (pts, colors) = plane_cloud(40, |x, _| 2.0 + 0.5 * x);
        let index = PointIndex::build(&pts);
        let normals = estimate_normals(&pts, &index, 12);
        let mesh = reconstruct(&pts, &colors, &normals, &index, 16).unwrap();
        assert!(mesh.face_count() > 50);
        assert_eq!(mesh.colors().unwrap()[0], [10, 20, 30]);
        // every vertex sits on the plane, every face looks toward -Z
        for v in mesh.vertices() {
            assert!((v.z - (2.0 + 0.5 * v.x)).abs() < 0.05);
        }
        for f in mesh.faces() {
            assert!(mesh.face_normal(f).z < 0.0);
        }
    }

    #[test]
    fn flat_cloud_still_reconstructs() {
        let (pts, colors) = plane_cloud(20, |_, _| 3.0);
        let index = PointIndex::build(&pts);
        let normals = estimate_normals(&pts, &index, 8);
        let mesh = reconstruct(&pts, &colors, &normals, &index, 10).unwrap();
        assert!(mesh.face_count() > 0);
    }

    #[test]
    fn single_point_is_degenerate() {
        let pts = vec![Point3::new(1.0, 1.0, 1.0)];
        let index = PointIndex::build(&pts);
        let err = reconstruct(&pts, &[[0, 0, 0]], &[-Vector3::z()], &index, 8).unwrap_err();
        assert_eq!(err, ReconstructError::DegenerateExtent);
    }
}

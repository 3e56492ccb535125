// delaunay.rs - Bowyer-Watson triangulation of the XY projection
//
// Insert points one at a time into a super-triangle, carving out every
// triangle whose circumcircle contains the new point and re-fanning the
// hole. Triangles touching the super-triangle are dropped at the end.

use nalgebra::{Point2, Point3};
use std::collections::{HashMap, HashSet};

use crate::error::{ReconstructError, ReconstructResult};

const SUPER_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
struct Tri {
    v: [usize; 3],
    center: Point2<f64>,
    radius_sq: f64,
}

impl Tri {
    fn new(v: [usize; 3], pts: &[Point2<f64>]) -> Option<Self> {
        let (a, b, c) = (pts[v[0]], pts[v[1]], pts[v[2]]);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < f64::EPSILON {
            return None;
        }
        let (a2, b2, c2) = (a.coords.norm_squared(), b.coords.norm_squared(), c.coords.norm_squared());
        let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        let center = Point2::new(ux, uy);
        Some(Self { v, center, radius_sq: (a - center).norm_squared() })
    }

    fn circumcircle_contains(&self, p: &Point2<f64>) -> bool {
        (p - self.center).norm_squared() < self.radius_sq * (1.0 + 1e-12)
    }
}

/// Counter-clockwise triangles over `points` (indices into the slice),
/// built from their x/y coordinates.
pub fn triangulate_xy(points: &[Point3<f64>]) -> ReconstructResult<Vec<[u32; 3]>> {
    if points.len() < 3 {
        return Err(ReconstructError::Triangulation(format!("{} points", points.len())));
    }

    let mut pts: Vec<Point2<f64>> = points.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let (mut min, mut max) = (pts[0], pts[0]);
    for p in &pts {
        min = min.inf(p);
        max = max.sup(p);
    }
    let span = (max - min).amax();
    if !(span > 0.0) || !span.is_finite() {
        return Err(ReconstructError::Triangulation("points coincide in xy".into()));
    }

    // super-triangle comfortably enclosing every point
    let mid = nalgebra::center(&min, &max);
    let n = pts.len();
    pts.push(Point2::new(mid.x - SUPER_SCALE * span, mid.y - span));
    pts.push(Point2::new(mid.x, mid.y + SUPER_SCALE * span));
    pts.push(Point2::new(mid.x + SUPER_SCALE * span, mid.y - span));

    let Some(root) = Tri::new([n, n + 1, n + 2], &pts) else {
        return Err(ReconstructError::Triangulation("degenerate bounding triangle".into()));
    };
    let mut tris = vec![root];

    // skip exact xy duplicates
    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(n);
    for i in 0..n {
        let p = pts[i];
        if !seen.insert((p.x.to_bits(), p.y.to_bits())) {
            continue;
        }

        let mut bad = Vec::new();
        tris.retain(|t| {
            if t.circumcircle_contains(&p) {
                bad.push(*t);
                false
            } else {
                true
            }
        });

        // hole boundary: edges of bad triangles not shared by two of them
        let mut edge_count: HashMap<(usize, usize), u32> = HashMap::new();
        for t in &bad {
            for k in 0..3 {
                let (a, b) = (t.v[k], t.v[(k + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        for t in &bad {
            for k in 0..3 {
                let (a, b) = (t.v[k], t.v[(k + 1) % 3]);
                if edge_count[&(a.min(b), a.max(b))] == 1 {
                    if let Some(t) = Tri::new([a, b, i], &pts) {
                        tris.push(t);
                    }
                }
            }
        }
    }

    let faces: Vec<[u32; 3]> = tris
        .iter()
        .filter(|t| t.v.iter().all(|&v| v < n))
        .map(|t| {
            let [a, b, c] = t.v;
            let (pa, pb, pc) = (pts[a], pts[b], pts[c]);
            let cross = (pb - pa).perp(&(pc - pa));
            if cross < 0.0 { [a as u32, c as u32, b as u32] } else { [a as u32, b as u32, c as u32] }
        })
        .collect();

    if faces.is_empty() {
        return Err(ReconstructError::Triangulation("all points collinear".into()));
    }
    Ok(faces)
}

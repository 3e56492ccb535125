// decimate.rs - Edge-collapse simplification with quadric error metrics
//
// Cheapest edge first. Stale heap entries are skipped by comparing per-vertex
// version stamps instead of rebuilding the queue. Open borders keep their
// outline: a border vertex never moves inward, and two border vertices only
// merge along a border edge.

use nalgebra::{Point3, Vector3};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info};

use super::quadric::Quadric;
use crate::mesh::{Mesh, MeshBuilder};

const BORDER_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct DecimationResult {
    pub mesh: Mesh,
    pub original_faces: usize,
    pub final_faces: usize,
    pub collapses: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
struct EdgeCollapse {
    keep: u32,
    remove: u32,
    cost: f64,
    target: Point3<f64>,
    stamp: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on cost
        other.cost.total_cmp(&self.cost)
    }
}

struct Working {
    pos: Vec<Point3<f64>>,
    colors: Option<Vec<[f64; 3]>>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vert_alive: Vec<bool>,
    vert_faces: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    border: Vec<bool>,
    version: Vec<u32>,
}

/// Reduce `mesh` to at most `target` faces where the geometry allows.
pub fn decimate(mesh: &Mesh, target: usize) -> DecimationResult {
    let original = mesh.face_count();
    if original <= target {
        return DecimationResult {
            mesh: mesh.clone(),
            original_faces: original,
            final_faces: original,
            collapses: 0,
            rejected: 0,
        };
    }

    info!(original, target, "Starting mesh decimation");

    let mut w = Working::new(mesh);
    let mut heap = BinaryHeap::new();
    let mut edges = HashSet::new();
    for f in &w.faces {
        for i in 0..3 {
            let (a, b) = (f[i].min(f[(i + 1) % 3]), f[i].max(f[(i + 1) % 3]));
            if edges.insert((a, b)) {
                if let Some(c) = w.candidate(a, b) {
                    heap.push(c);
                }
            }
        }
    }

    let mut active = original;
    let mut collapses = 0;
    let mut rejected = 0;

    while active > target {
        let Some(c) = heap.pop() else { break };
        let (k, r) = (c.keep as usize, c.remove as usize);
        if !w.vert_alive[k] || !w.vert_alive[r] || (w.version[k], w.version[r]) != c.stamp {
            continue;
        }
        if !w.can_collapse(c.keep, c.remove, &c.target) {
            rejected += 1;
            continue;
        }

        active -= w.collapse(c.keep, c.remove, c.target);
        collapses += 1;

        for u in w.neighbors(c.keep) {
            if let Some(next) = w.candidate(c.keep, u) {
                heap.push(next);
            }
        }
    }

    let mesh = w.into_mesh();
    info!(final_faces = mesh.face_count(), collapses, rejected, "Decimation complete");

    DecimationResult { original_faces: original, final_faces: mesh.face_count(), mesh, collapses, rejected }
}

impl Working {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.vertex_count();
        let faces = mesh.faces().to_vec();
        let pos = mesh.vertices().to_vec();

        let mut vert_faces = vec![Vec::new(); n];
        let mut quadrics = vec![Quadric::default(); n];
        let mut edge_use: HashMap<(u32, u32), u32> = HashMap::new();
        for (fi, f) in faces.iter().enumerate() {
            for &v in f {
                vert_faces[v as usize].push(fi);
            }
            for i in 0..3 {
                let (a, b) = (f[i].min(f[(i + 1) % 3]), f[i].max(f[(i + 1) % 3]));
                *edge_use.entry((a, b)).or_default() += 1;
            }
            let normal = mesh.face_normal(f);
            if let Some(unit) = normal.try_normalize(1e-12) {
                let q = Quadric::from_plane(&unit, &pos[f[0] as usize]);
                for &v in f {
                    quadrics[v as usize] += q;
                }
            }
        }

        // border edges get a stiff plane perpendicular to their face so the
        // outline resists being pulled inward
        let mut border = vec![false; n];
        for f in &faces {
            let normal = mesh.face_normal(f);
            for i in 0..3 {
                let (a, b) = (f[i], f[(i + 1) % 3]);
                if edge_use.get(&(a.min(b), a.max(b))) != Some(&1) {
                    continue;
                }
                border[a as usize] = true;
                border[b as usize] = true;
                let (pa, pb) = (pos[a as usize], pos[b as usize]);
                if let Some(side) = (pb - pa).cross(&normal).try_normalize(1e-12) {
                    let q = Quadric::from_plane(&side, &pa).scaled(BORDER_WEIGHT);
                    quadrics[a as usize] += q;
                    quadrics[b as usize] += q;
                }
            }
        }
        debug!(border = border.iter().filter(|&&b| b).count(), "Border vertices");

        Self {
            pos,
            colors: mesh
                .colors()
                .map(|c| c.iter().map(|c| [f64::from(c[0]), f64::from(c[1]), f64::from(c[2])]).collect()),
            face_alive: vec![true; faces.len()],
            faces,
            vert_alive: vec![true; n],
            vert_faces,
            quadrics,
            border,
            version: vec![0; n],
        }
    }

    fn alive_faces(&self, v: u32) -> impl Iterator<Item = usize> + '_ {
        self.vert_faces[v as usize].iter().copied().filter(|&fi| self.face_alive[fi])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .alive_faces(v)
            .flat_map(|fi| self.faces[fi])
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn shared_faces(&self, a: u32, b: u32) -> usize {
        self.alive_faces(a).filter(|&fi| self.faces[fi].contains(&b)).count()
    }

    fn candidate(&self, a: u32, b: u32) -> Option<EdgeCollapse> {
        let (ba, bb) = (self.border[a as usize], self.border[b as usize]);
        let mut q = self.quadrics[a as usize];
        q += self.quadrics[b as usize];
        let (pa, pb) = (self.pos[a as usize], self.pos[b as usize]);

        let (keep, remove, target) = match (ba, bb) {
            (true, false) => (a, b, pa),
            (false, true) => (b, a, pb),
            (true, true) => {
                if self.shared_faces(a, b) != 1 {
                    return None;
                }
                if q.error(&pa) <= q.error(&pb) { (a, b, pa) } else { (b, a, pb) }
            }
            (false, false) => {
                let mid = nalgebra::center(&pa, &pb);
                let best = [pa, pb, mid]
                    .into_iter()
                    .min_by(|x, y| q.error(x).total_cmp(&q.error(y)))
                    .unwrap_or(mid);
                let target = q
                    .optimal_point()
                    .filter(|p| (p - mid).norm() <= 2.0 * (pa - pb).norm().max(1e-9))
                    .filter(|p| q.error(p) <= q.error(&best))
                    .unwrap_or(best);
                (a, b, target)
            }
        };

        let cost = q.error(&target);
        if !cost.is_finite() {
            return None;
        }
        Some(EdgeCollapse {
            keep,
            remove,
            cost,
            target,
            stamp: (self.version[keep as usize], self.version[remove as usize]),
        })
    }

    fn can_collapse(&self, keep: u32, remove: u32, target: &Point3<f64>) -> bool {
        // link condition: the only shared neighbours are the opposite
        // corners of the faces on the edge
        let nk: HashSet<u32> = self.neighbors(keep).into_iter().collect();
        let common = self.neighbors(remove).into_iter().filter(|u| nk.contains(u)).count();
        if common != self.shared_faces(keep, remove) {
            return false;
        }

        // no face may flip or collapse to a sliver
        for v in [keep, remove] {
            for fi in self.alive_faces(v) {
                let f = self.faces[fi];
                if f.contains(&keep) && f.contains(&remove) {
                    continue;
                }
                let old = self.normal_of(f, None);
                let new = self.normal_of(f, Some((v, target)));
                if new.norm_squared() < 1e-24 || old.dot(&new) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn normal_of(&self, f: [u32; 3], moved: Option<(u32, &Point3<f64>)>) -> Vector3<f64> {
        let p = |i: u32| match moved {
            Some((v, t)) if v == i => *t,
            _ => self.pos[i as usize],
        };
        let (a, b, c) = (p(f[0]), p(f[1]), p(f[2]));
        (b - a).cross(&(c - a))
    }

    /// Merge `remove` into `keep`; returns how many faces died.
    fn collapse(&mut self, keep: u32, remove: u32, target: Point3<f64>) -> usize {
        let (k, r) = (keep as usize, remove as usize);
        self.pos[k] = target;
        let qr = self.quadrics[r];
        self.quadrics[k] += qr;
        if let Some(colors) = &mut self.colors {
            let (ck, cr) = (colors[k], colors[r]);
            colors[k] = [(ck[0] + cr[0]) / 2.0, (ck[1] + cr[1]) / 2.0, (ck[2] + cr[2]) / 2.0];
        }
        self.border[k] |= self.border[r];

        let mut removed = 0;
        let faces_r = std::mem::take(&mut self.vert_faces[r]);
        for fi in faces_r {
            if !self.face_alive[fi] {
                continue;
            }
            if self.faces[fi].contains(&keep) {
                self.face_alive[fi] = false;
                removed += 1;
            } else {
                for idx in &mut self.faces[fi] {
                    if *idx == remove {
                        *idx = keep;
                    }
                }
                self.vert_faces[k].push(fi);
            }
        }
        let alive = &self.face_alive;
        self.vert_faces[k].retain(|&fi| alive[fi]);

        self.vert_alive[r] = false;
        self.version[k] += 1;
        self.version[r] += 1;
        removed
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![u32::MAX; self.pos.len()];
        let live: Vec<[u32; 3]> = self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, alive)| **alive)
            .map(|(f, _)| *f)
            .collect();

        let mut b = MeshBuilder::with_capacity(self.colors.is_some(), self.pos.len(), live.len());
        for f in &live {
            for &v in f {
                let slot = &mut remap[v as usize];
                if *slot == u32::MAX {
                    let color = self.colors.as_ref().map(|c| {
                        let c = c[v as usize];
                        [c[0].round() as u8, c[1].round() as u8, c[2].round() as u8]
                    });
                    *slot = b.vertex(self.pos[v as usize], color);
                }
            }
        }
        for f in live {
            let mapped = [remap[f[0] as usize], remap[f[1] as usize], remap[f[2] as usize]];
            // indices were just assigned above, so this cannot fail
            if b.face(mapped).is_err() {
                continue;
            }
        }
        b.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat n x n vertex grid in the z = 0 plane.
    fn grid(n: u32) -> Mesh {
        let mut b = MeshBuilder::new(true);
        for y in 0..n {
            for x in 0..n {
                b.vertex(Point3::new(f64::from(x), f64::from(y), 0.0), Some([200, 100, 50]));
            }
        }
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let i = y * n + x;
                b.face([i, i + 1, i + n]).unwrap();
                b.face([i + 1, i + n + 1, i + n]).unwrap();
            }
        }
        b.build()
    }

    #[test]
    fn below_target_is_untouched() {
        let m = grid(4);
        let r = decimate(&m, 100);
        assert_eq!(r.collapses, 0);
        assert_eq!(r.mesh, m);
    }

    #[test]
    fn flat_grid_reduces_and_stays_valid() {
        let m = grid(20);
        assert_eq!(m.face_count(), 722);
        let r = decimate(&m, 200);
        assert!(r.final_faces <= 200);
        assert!(r.collapses > 0);
        let n = r.mesh.vertex_count() as u32;
        assert!(r.mesh.faces().iter().flatten().all(|&i| i < n));
        // planar input stays planar and keeps its outline
        assert!(r.mesh.vertices().iter().all(|p| p.z.abs() < 1e-9));
        let b = r.mesh.bounds().unwrap();
        assert!((b.max.x - 19.0).abs() < 1e-9 && (b.max.y - 19.0).abs() < 1e-9);
        assert!(b.min.x.abs() < 1e-9 && b.min.y.abs() < 1e-9);
        assert_eq!(r.mesh.colors().unwrap()[0], [200, 100, 50]);
    }

    #[test]
    fn faces_never_flip() {
        let r = decimate(&grid(12), 40);
        for f in r.mesh.faces() {
            assert!(r.mesh.face_normal(f).z > 0.0);
        }
    }
}

// index.rs - Nearest-neighbour index over cloud points
//
// Points lifted from a depth grid share coordinates along whole rows, which
// overflows k-d tree buckets. Keys get a tiny per-index offset so no two
// share a value on any axis; queries still return indices into the
// original points.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

const KEY_JITTER: f64 = 1e-9;

pub struct PointIndex {
    tree: KdTree<f64, 3>,
    len: usize,
}

impl PointIndex {
    pub fn build(points: &[Point3<f64>]) -> Self {
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.add(&key(p, i), i as u64);
        }
        Self { tree, len: points.len() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Up to `k` nearest point indices, closest first.
    pub fn nearest_n(&self, p: &Point3<f64>, k: usize) -> Vec<usize> {
        if self.len == 0 || k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y, p.z], k.min(self.len))
            .into_iter()
            .map(|n| n.item as usize)
            .collect()
    }

    /// Nearest point index and its squared distance.
    pub fn nearest(&self, p: &Point3<f64>) -> Option<(usize, f64)> {
        if self.len == 0 {
            return None;
        }
        let n = self.tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
        Some((n.item as usize, n.distance))
    }
}

fn key(p: &Point3<f64>, i: usize) -> [f64; 3] {
    // low-discrepancy fractions, distinct per index and axis
    let t = i as f64;
    let fx = (t * 0.618_033_988_749_895).fract();
    let fy = (t * 0.754_877_666_246_693).fract();
    let fz = (t * 0.569_840_290_998_053).fract();
    let s = KEY_JITTER * (1.0 + p.coords.amax());
    [p.x + fx * s, p.y + fy * s, p.z + fz * s]
}

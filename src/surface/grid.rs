// grid.rs - Row-major grid triangulation
//
// Last-resort surface: treat the points as a g x g raster in the order they
// were lifted (g = floor(sqrt(n))) and split every cell into two triangles.

/// Faces for `n` points laid out row-major on a square grid. Cells whose
/// far corner falls past the last point are skipped.
pub fn grid_faces(n: usize) -> Vec<[u32; 3]> {
    let g = (n as f64).sqrt().floor() as usize;
    if g < 2 {
        return Vec::new();
    }
    let mut faces = Vec::with_capacity(2 * (g - 1) * (g - 1));
    for i in 0..g - 1 {
        for j in 0..g - 1 {
            let idx = i * g + j;
            if idx + g + 1 >= n {
                continue;
            }
            let (a, b, c, d) = (idx as u32, (idx + 1) as u32, (idx + g) as u32, (idx + g + 1) as u32);
            faces.push([a, b, c]);
            faces.push([b, d, c]);
        }
    }
    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_square_is_two_triangles() {
        let faces = grid_faces(4);
        assert_eq!(faces, vec![[0, 1, 2], [1, 3, 2]]);
    }

    #[test]
    fn leftover_points_are_ignored() {
        // 10 points -> 3 x 3 grid, the tenth point is unused
        let faces = grid_faces(10);
        assert_eq!(faces.len(), 8);
        assert!(faces.iter().flatten().all(|&i| i < 9));
    }

    #[test]
    fn too_few_points_give_nothing() {
        assert!(grid_faces(0).is_empty());
        assert!(grid_faces(3).is_empty());
    }
}

// mesh/mod.rs - Indexed triangle mesh with optional vertex colors
//
// Faces can only be added through MeshBuilder, which checks every index
// against the vertex count, so a Mesh never holds a dangling face.

use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::error::{ReconstructError, ReconstructResult};

/// Color given to vertices appended without one to a colored mesh.
pub const NEUTRAL_GRAY: [u8; 3] = [128, 128, 128];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(mn, mx), p| (mn.inf(p), mx.sup(p)));
        Some(Self { min, max })
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f64 {
        self.extent().norm()
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Mesh {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[u32; 3]>,
    colors: Option<Vec<[u8; 3]>>,
}

impl Mesh {
    /// Mesh with no geometry at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and assemble a mesh from raw parts.
    pub fn from_parts(
        vertices: Vec<Point3<f64>>,
        faces: Vec<[u32; 3]>,
        colors: Option<Vec<[u8; 3]>>,
    ) -> ReconstructResult<Self> {
        let mut b = MeshBuilder::new(colors.is_some());
        let colors = colors.unwrap_or_default();
        for (i, p) in vertices.into_iter().enumerate() {
            b.vertex(p, colors.get(i).copied());
        }
        for f in faces {
            b.face(f)?;
        }
        Ok(b.build())
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    /// Mean of all vertex positions.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self.vertices.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.vertices.len() as f64))
    }

    /// Unnormalized face normal (length is twice the area).
    pub fn face_normal(&self, face: &[u32; 3]) -> Vector3<f64> {
        let a = self.vertices[face[0] as usize];
        let b = self.vertices[face[1] as usize];
        let c = self.vertices[face[2] as usize];
        (b - a).cross(&(c - a))
    }

    /// Area-weighted vertex normals. Isolated vertices get +Z.
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for f in &self.faces {
            let n = self.face_normal(f);
            for &i in f {
                normals[i as usize] += n;
            }
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::z))
            .collect()
    }
}

/// Append-only mesh assembly.
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[u32; 3]>,
    colors: Option<Vec<[u8; 3]>>,
}

impl MeshBuilder {
    pub fn new(colored: bool) -> Self {
        Self { vertices: Vec::new(), faces: Vec::new(), colors: colored.then(Vec::new) }
    }

    pub fn with_capacity(colored: bool, vertices: usize, faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            faces: Vec::with_capacity(faces),
            colors: colored.then(|| Vec::with_capacity(vertices)),
        }
    }

    /// Continue building on top of an existing mesh.
    pub fn from_mesh(mesh: Mesh) -> Self {
        Self { vertices: mesh.vertices, faces: mesh.faces, colors: mesh.colors }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn position(&self, i: u32) -> Point3<f64> {
        self.vertices[i as usize]
    }

    /// Push a vertex and return its index. The color is dropped on an
    /// uncolored mesh and defaults to gray on a colored one.
    pub fn vertex(&mut self, p: Point3<f64>, color: Option<[u8; 3]>) -> u32 {
        let idx = self.vertices.len() as u32;
        self.vertices.push(p);
        if let Some(colors) = &mut self.colors {
            colors.push(color.unwrap_or(NEUTRAL_GRAY));
        }
        idx
    }

    pub fn face(&mut self, face: [u32; 3]) -> ReconstructResult<()> {
        let n = self.vertices.len();
        if face.iter().any(|&i| i as usize >= n) {
            return Err(ReconstructError::InvalidFace { face, vertex_count: n });
        }
        self.faces.push(face);
        Ok(())
    }

    /// Append a block of geometry whose faces index into `vertices`
    /// (0-based); every index is shifted past the existing vertices.
    pub fn append_with_offset(
        &mut self,
        vertices: &[Point3<f64>],
        faces: &[[u32; 3]],
        color: Option<[u8; 3]>,
    ) -> ReconstructResult<()> {
        if let Some(&bad) = faces.iter().find(|f| f.iter().any(|&i| i as usize >= vertices.len())) {
            return Err(ReconstructError::InvalidFace { face: bad, vertex_count: vertices.len() });
        }
        let offset = self.vertices.len() as u32;
        for &p in vertices {
            self.vertex(p, color);
        }
        self.faces.extend(faces.iter().map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]));
        Ok(())
    }

    pub fn build(self) -> Mesh {
        Mesh { vertices: self.vertices, faces: self.faces, colors: self.colors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> Mesh {
        Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
            None,
        )
        .unwrap()
    }

    #[test]
    fn bounds_and_centroid() {
        let m = quad();
        let b = m.bounds().unwrap();
        assert_eq!(b.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b.max, Point3::new(1.0, 1.0, 0.0));
        let c = m.centroid().unwrap();
        assert_relative_eq!(c.x, 0.5);
        assert_relative_eq!(c.y, 0.5);
        assert_relative_eq!(b.diagonal(), 2f64.sqrt());
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        let m = Mesh::empty();
        assert!(m.bounds().is_none());
        assert!(m.centroid().is_none());
        assert_eq!(m.face_count(), 0);
    }

    #[test]
    fn builder_rejects_dangling_face() {
        let mut b = MeshBuilder::new(false);
        b.vertex(Point3::origin(), None);
        let err = b.face([0, 0, 1]).unwrap_err();
        assert_eq!(err, ReconstructError::InvalidFace { face: [0, 0, 1], vertex_count: 1 });
    }

    #[test]
    fn append_with_offset_shifts_indices() {
        let mut b = MeshBuilder::from_mesh(quad());
        let tri = [Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0), Point3::new(0.0, 1.0, 1.0)];
        b.append_with_offset(&tri, &[[0, 1, 2]], None).unwrap();
        let m = b.build();
        assert_eq!(m.vertex_count(), 7);
        assert_eq!(m.faces()[2], [4, 5, 6]);
    }

    #[test]
    fn colored_builder_fills_gray() {
        let mut b = MeshBuilder::new(true);
        b.vertex(Point3::origin(), Some([1, 2, 3]));
        b.vertex(Point3::origin(), None);
        let m = b.build();
        assert_eq!(m.colors().unwrap(), &[[1, 2, 3], NEUTRAL_GRAY]);
    }

    #[test]
    fn vertex_normals_point_up_for_ccw_quad() {
        let n = quad().vertex_normals();
        for v in n {
            assert_relative_eq!(v.z, 1.0);
        }
    }
}

// json.rs - Plain JSON scene, the exporter's last resort
//
// Readable by anything, and read back by `read_json_scene`.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{ExportError, ExportResult, ReconstructResult};
use crate::lighting::LightingModel;
use crate::mesh::Mesh;
use crate::pipeline::SceneResult;

const FORMAT_NAME: &str = "ar_memory_scene";
const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonGeometry {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
    #[serde(default)]
    pub vertex_colors: Vec<[u8; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonMetadata {
    pub vertex_count: usize,
    pub face_count: usize,
    /// `[min, max]`, empty for a mesh without vertices.
    pub bounds: Vec<[f64; 3]>,
    pub center: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonScene {
    pub format: String,
    pub version: String,
    pub geometry: JsonGeometry,
    pub lighting: LightingModel,
    pub metadata: JsonMetadata,
}

impl JsonScene {
    pub fn from_scene(scene: &SceneResult) -> Self {
        let mesh = &scene.mesh;
        let bounds: Vec<[f64; 3]> = mesh.bounds().map(|b| vec![b.min.into(), b.max.into()]).unwrap_or_default();
        let center = mesh.centroid().map_or([0.0; 3], Into::into);
        Self {
            format: FORMAT_NAME.into(),
            version: FORMAT_VERSION.into(),
            geometry: JsonGeometry {
                vertices: mesh.vertices().iter().map(|&p| p.into()).collect(),
                faces: mesh.faces().to_vec(),
                vertex_colors: mesh.colors().map(<[_]>::to_vec).unwrap_or_default(),
            },
            lighting: scene.lighting,
            metadata: JsonMetadata {
                vertex_count: mesh.vertex_count(),
                face_count: mesh.face_count(),
                bounds,
                center,
            },
        }
    }

    /// Rebuild the mesh, re-validating every face.
    pub fn to_mesh(&self) -> ReconstructResult<Mesh> {
        let g = &self.geometry;
        let colors = (!g.vertex_colors.is_empty()).then(|| g.vertex_colors.clone());
        Mesh::from_parts(g.vertices.iter().map(|&v| Point3::from(v)).collect(), g.faces.clone(), colors)
    }
}

pub fn write_json_scene(scene: &SceneResult, path: &Path) -> ExportResult<()> {
    let doc = JsonScene::from_scene(scene);
    let text = serde_json::to_string_pretty(&doc)?;
    fs::write(path, text).map_err(|e| ExportError::io(path, e))?;
    info!(path = %path.display(), vertices = doc.metadata.vertex_count, "Wrote JSON scene");
    Ok(())
}

pub fn read_json_scene(path: &Path) -> ExportResult<JsonScene> {
    let text = fs::read_to_string(path).map_err(|e| ExportError::io(path, e))?;
    let doc: JsonScene = serde_json::from_str(&text)?;
    if doc.format != FORMAT_NAME {
        return Err(ExportError::InvalidMesh(format!("unexpected format {:?}", doc.format)));
    }
    Ok(doc)
}

// export/mod.rs - Scene artifacts: model files, preview raster, web-AR bundle
//
// The model format follows the output path's extension. Any failure while
// writing the model falls back to a plain JSON scene next to it; only a
// failure to write that JSON reaches the caller.

pub mod gltf;
mod json;
mod obj;
mod preview;
mod web;

pub use json::{JsonGeometry, JsonMetadata, JsonScene, read_json_scene, write_json_scene};
pub use preview::render_preview;
pub use web::{ArConfig, ArMetadata, LightingHints, WebBundle};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ExportError, ExportResult};
use crate::pipeline::SceneResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Edge length of the square preview, pixels.
    pub preview_size: u32,
    pub jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { preview_size: 512, jpeg_quality: 85 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Glb,
    Gltf,
    Obj,
}

impl ExportFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "glb" => Some(Self::Glb),
            "gltf" => Some(Self::Gltf),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Glb => "glb",
            Self::Gltf => "gltf",
            Self::Obj => "obj",
        }
    }

    /// Format chosen by `path`'s extension. Unknown or missing extensions
    /// become GLB, with the returned path corrected to match.
    pub fn resolve(path: &Path) -> (Self, PathBuf) {
        let known = path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension);
        match known {
            Some(format) => (format, path.to_path_buf()),
            None => (Self::Glb, path.with_extension(Self::Glb.extension())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArExporter {
    config: ExportConfig,
}

impl ArExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Write `scene` to `path` and return where it actually landed.
    pub fn export(&self, scene: &SceneResult, path: &Path) -> ExportResult<PathBuf> {
        let (format, target) = ExportFormat::resolve(path);
        match write_model(scene, format, &target) {
            Ok(()) => {
                info!(
                    path = %target.display(),
                    format = format.extension(),
                    vertices = scene.mesh.vertex_count(),
                    faces = scene.mesh.face_count(),
                    "Exported scene"
                );
                Ok(target)
            }
            Err(e) => {
                warn!(error = %e, format = format.extension(), "Model export failed, writing JSON scene");
                let json_path = path.with_extension("json");
                write_json_scene(scene, &json_path)?;
                Ok(json_path)
            }
        }
    }

    /// Render and write the JPEG preview.
    pub fn generate_preview(&self, scene: &SceneResult, path: &Path) -> ExportResult<PathBuf> {
        let img = render_preview(scene, self.config.preview_size);
        let file = fs::File::create(path).map_err(|e| ExportError::io(path, e))?;
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(BufWriter::new(file), self.config.jpeg_quality);
        img.write_with_encoder(encoder)?;
        info!(path = %path.display(), size = self.config.preview_size, "Wrote preview");
        Ok(path.to_path_buf())
    }

    pub fn ar_metadata(&self, scene: &SceneResult) -> ArMetadata {
        ArMetadata::for_scene(scene)
    }

    /// Write `scene.glb`, `ar_config.json` and `viewer.html` into `dir`.
    pub fn export_web_bundle(&self, scene: &SceneResult, dir: &Path) -> ExportResult<WebBundle> {
        web::write_bundle(self, scene, dir)
    }
}

fn write_model(scene: &SceneResult, format: ExportFormat, path: &Path) -> ExportResult<()> {
    if scene.mesh.is_empty() {
        return Err(ExportError::InvalidMesh("no vertices".into()));
    }
    match format {
        ExportFormat::Glb => {
            let bytes = gltf::to_glb(scene)?;
            fs::write(path, bytes).map_err(|e| ExportError::io(path, e))
        }
        ExportFormat::Gltf => {
            let text = gltf::to_gltf(scene)?;
            fs::write(path, text).map_err(|e| ExportError::io(path, e))
        }
        ExportFormat::Obj => obj::write_obj(scene, path),
    }
}

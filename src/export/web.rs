// web.rs - AR metadata and the browser bundle (model + config + viewer page)

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::ArExporter;
use crate::error::{ExportError, ExportResult};
use crate::lighting::LightingModel;
use crate::pipeline::SceneResult;

const SCALE_RANGE: (f64, f64) = (0.1, 2.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightingHints {
    pub use_environment_lighting: bool,
    pub light_intensity: f64,
    pub shadow_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArMetadata {
    pub ar_format_version: &'static str,
    pub scene_type: &'static str,
    /// Brings the scene to roughly unit size, within [0.1, 2.0].
    pub recommended_scale: f64,
    pub anchor_type: &'static str,
    pub lighting_estimation: bool,
    pub occlusion_enabled: bool,
    pub physics_enabled: bool,
    pub interaction_enabled: bool,
    pub lighting: LightingHints,
}

impl ArMetadata {
    pub fn for_scene(scene: &SceneResult) -> Self {
        let recommended_scale = scene
            .mesh
            .bounds()
            .map_or(1.0, |b| (1.0 / b.diagonal()).clamp(SCALE_RANGE.0, SCALE_RANGE.1));
        Self {
            ar_format_version: "1.0",
            scene_type: "memory_reconstruction",
            recommended_scale,
            anchor_type: "horizontal_plane",
            lighting_estimation: true,
            occlusion_enabled: true,
            physics_enabled: false,
            interaction_enabled: true,
            lighting: LightingHints {
                use_environment_lighting: true,
                light_intensity: scene.lighting.intensity,
                shadow_intensity: scene.lighting.shadow_strength,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArConfig {
    pub model_url: String,
    pub scale: f64,
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub lighting: LightingModel,
    pub metadata: ArMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebBundle {
    pub model_path: PathBuf,
    pub config_path: PathBuf,
    pub viewer_path: PathBuf,
}

pub(super) fn write_bundle(exporter: &ArExporter, scene: &SceneResult, dir: &Path) -> ExportResult<WebBundle> {
    fs::create_dir_all(dir).map_err(|e| ExportError::io(dir, e))?;

    let model_path = exporter.export(scene, &dir.join("scene.glb"))?;
    let model_url = model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene.glb".into());

    let config = ArConfig {
        model_url,
        scale: 1.0,
        position: [0.0; 3],
        rotation: [0.0; 3],
        lighting: scene.lighting,
        metadata: exporter.ar_metadata(scene),
    };
    let config_path = dir.join("ar_config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?).map_err(|e| ExportError::io(&config_path, e))?;

    let viewer_path = dir.join("viewer.html");
    fs::write(&viewer_path, viewer_html(&config)).map_err(|e| ExportError::io(&viewer_path, e))?;

    info!(dir = %dir.display(), model = %config.model_url, "Wrote web AR bundle");
    Ok(WebBundle { model_path, config_path, viewer_path })
}

fn viewer_html(config: &ArConfig) -> String {
    let [px, py, pz] = config.position;
    let [rx, ry, rz] = config.rotation;
    let s = config.scale;
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>AR Memory Viewer</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <script src="https://aframe.io/releases/1.4.0/aframe.min.js"></script>
    <script src="https://cdn.jsdelivr.net/gh/AR-js-org/AR.js/aframe/build/aframe-ar.js"></script>
</head>
<body style="margin: 0; font-family: Arial;">
    <a-scene embedded arjs="sourceType: webcam; debugUIEnabled: false;" vr-mode-ui="enabled: false"
             renderer="logarithmicDepthBuffer: true;" loading-screen="enabled: false">
        <a-marker preset="hiro">
            <a-entity gltf-model="url({url})" scale="{s} {s} {s}"
                      position="{px} {py} {pz}" rotation="{rx} {ry} {rz}"></a-entity>
        </a-marker>
        <a-entity camera></a-entity>
    </a-scene>
    <div style="position: fixed; top: 10px; left: 10px; color: white; background: rgba(0,0,0,0.7); padding: 10px; border-radius: 5px;">
        <h3>AR Memory Viewer</h3>
        <p>Point the camera at a Hiro marker to view the memory</p>
    </div>
</body>
</html>
"#,
        url = config.model_url,
    )
}

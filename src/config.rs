// config.rs - Pipeline configuration
//
// One JSON document, every section optional. The defaults reproduce the
// constants the pipeline has always used, so an empty `{}` is a valid file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::AnalysisConfig;
use crate::cloud::DepthProfile;
use crate::depth::DepthConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::export::ExportConfig;
use crate::pipeline::ProcessingOptions;
use crate::surface::SurfaceParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub options: ProcessingOptions,
    pub analysis: AnalysisConfig,
    pub depth: DepthConfig,
    /// Profile used when lifting depth straight from the estimator.
    pub direct_profile: DepthProfile,
    /// Profile used for the scene reconstruction path.
    pub scene_profile: DepthProfile,
    pub surface: SurfaceParams,
    pub export: ExportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            options: ProcessingOptions::default(),
            analysis: AnalysisConfig::default(),
            depth: DepthConfig::default(),
            direct_profile: DepthProfile::direct(),
            scene_profile: DepthProfile::scene(),
            surface: SurfaceParams::default(),
            export: ExportConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, p) in [("direct_profile", &self.direct_profile), ("scene_profile", &self.scene_profile)] {
            if !(p.depth_scale.is_finite() && p.depth_scale > 0.0) {
                return Err(ConfigError::Invalid { field, reason: format!("depth_scale {} must be > 0", p.depth_scale) });
            }
            if !(p.z_min < p.z_max) {
                return Err(ConfigError::Invalid { field, reason: format!("empty z range ({}, {})", p.z_min, p.z_max) });
            }
        }
        if self.surface.grid_resolution < 4 {
            return Err(ConfigError::Invalid {
                field: "surface.grid_resolution",
                reason: format!("{} is below the minimum of 4", self.surface.grid_resolution),
            });
        }
        if self.surface.normal_neighbors < 3 {
            return Err(ConfigError::Invalid {
                field: "surface.normal_neighbors",
                reason: "need at least 3 neighbours for a plane fit".into(),
            });
        }
        if self.surface.decimate_target > self.surface.decimate_trigger {
            return Err(ConfigError::Invalid {
                field: "surface.decimate_target",
                reason: format!(
                    "target {} exceeds trigger {}",
                    self.surface.decimate_target, self.surface.decimate_trigger
                ),
            });
        }
        if self.depth.input_size == 0 {
            return Err(ConfigError::Invalid { field: "depth.input_size", reason: "must be > 0".into() });
        }
        if self.export.preview_size < 16 || !(1..=100).contains(&self.export.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "export",
                reason: format!(
                    "preview_size {} / jpeg_quality {} out of range",
                    self.export.preview_size, self.export.jpeg_quality
                ),
            });
        }
        Ok(())
    }
}

// pipeline.rs - Fixed-order reconstruction of one photograph
//
//   1. analyze the image
//   2. estimate depth
//   3. lift depth into point clouds (direct and scene profiles)
//   4. reconstruct a surface, optionally with a ground plane
//   5. derive lighting, optionally tuned to image quality
//   6. score the scene
//
// Export is left to the caller. Every stage degrades instead of failing.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::ImageAnalyzer;
use crate::cloud::{self, CameraParams, DepthProfile};
use crate::config::PipelineConfig;
use crate::depth::DepthEstimator;
use crate::lighting::{self, LightingModel};
use crate::mesh::Mesh;
use crate::scoring;
use crate::surface::{self, SurfaceReconstructor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub enhanced_depth: bool,
    pub lighting_optimization: bool,
    pub background_extension: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self { enhanced_depth: true, lighting_optimization: true, background_extension: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneResult {
    pub mesh: Mesh,
    pub lighting: LightingModel,
    /// [0, 1]
    pub complexity: f64,
    /// [0, 1]
    pub quality: f64,
}

/// What the caller records about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub quality_score: f64,
    pub depth_points: usize,
    /// Seconds.
    pub processing_time: f64,
    pub scene_complexity: f64,
}

pub struct Reconstructor {
    analyzer: ImageAnalyzer,
    depth: DepthEstimator,
    surface: SurfaceReconstructor,
    direct_profile: DepthProfile,
    scene_profile: DepthProfile,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Reconstructor {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            analyzer: ImageAnalyzer::from_config(&cfg.analysis),
            depth: DepthEstimator::from_config(&cfg.depth),
            surface: SurfaceReconstructor::new(cfg.surface.clone()),
            direct_profile: cfg.direct_profile,
            scene_profile: cfg.scene_profile,
        }
    }

    /// Swap the stage implementations, keeping the configured profiles.
    #[must_use]
    pub fn with_stages(mut self, analyzer: ImageAnalyzer, depth: DepthEstimator) -> Self {
        self.analyzer = analyzer;
        self.depth = depth;
        self
    }

    pub fn run(&self, img: &RgbImage, opts: &ProcessingOptions) -> (SceneResult, SceneSummary) {
        let start = Instant::now();
        let (w, h) = img.dimensions();
        info!(width = w, height = h, ?opts, "Reconstruction started");

        let analysis = self.analyzer.analyze(img);
        let depth = self.depth.estimate(img, opts.enhanced_depth).log_degraded("depth");

        let direct = cloud::project(img, &depth, None, &self.direct_profile);
        let camera = analysis
            .focal_length()
            .map(|f| CameraParams::with_focal(f, depth.width(), depth.height()));
        let scene_cloud = cloud::project(img, &depth, camera.as_ref(), &self.scene_profile);
        info!(direct = direct.len(), scene = scene_cloud.len(), "Point clouds ready");

        let mut mesh = self.surface.reconstruct(&scene_cloud).log_degraded("surface");
        if opts.background_extension {
            if let Err(e) = surface::extend_background(&mut mesh) {
                warn!(error = %e, "Background extension skipped");
            }
        }

        let mut light = lighting::derive_lighting(&analysis);
        if opts.lighting_optimization {
            lighting::optimize(&mut light, &analysis);
        }

        let complexity = scoring::complexity(&mesh);
        let quality = scoring::quality(complexity, &analysis);
        let scene = SceneResult { mesh, lighting: light, complexity, quality };

        let summary = SceneSummary {
            quality_score: quality,
            depth_points: direct.len(),
            processing_time: start.elapsed().as_secs_f64(),
            scene_complexity: complexity,
        };
        info!(
            vertices = scene.mesh.vertex_count(),
            faces = scene.mesh.face_count(),
            quality,
            complexity,
            seconds = summary.processing_time,
            "Reconstruction finished"
        );
        (scene, summary)
    }
}

// memory-reconstructor - Turn a single photograph into a navigable 3D scene
//
// Pipeline:
//   1. Analyze the image (quality, detections, lighting, features, camera)
//   2. Estimate depth (ONNX model, gradient fallback)
//   3. Lift depth into a colored point cloud
//   4. Reconstruct a surface mesh (implicit surface, triangulation fallbacks)
//   5. Derive and optimize a directional light
//   6. Score complexity and quality
//   7. Export GLB / glTF / OBJ plus a preview raster

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod analysis;
pub mod cloud;
pub mod config;
pub mod depth;
pub mod error;
pub mod export;
pub mod lighting;
pub mod mesh;
mod onnx;
pub mod outcome;
pub mod pipeline;
pub mod raster;
pub mod scoring;
pub mod surface;

pub use analysis::{ImageAnalysis, ImageAnalyzer};
pub use cloud::{CameraParams, DepthProfile, PointCloud};
pub use config::PipelineConfig;
pub use depth::{DepthEstimator, DepthMap};
pub use export::{ArExporter, ExportFormat};
pub use lighting::LightingModel;
pub use mesh::{Mesh, MeshBuilder};
pub use outcome::Outcome;
pub use pipeline::{ProcessingOptions, Reconstructor, SceneResult, SceneSummary};
pub use surface::SurfaceReconstructor;

// error.rs - Typed errors, one enum per concern
//
// Pipeline stages never return these to the caller directly; they are the
// reasons carried by a degraded Outcome or logged before a fallback. Only
// ExportError and ConfigError escape the library.

use std::path::PathBuf;
use thiserror::Error;

/// A sub-analysis of the image could not be computed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("detector failed: {0}")]
    Detector(#[from] ModelError),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// An injected model capability is missing or failed.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model configured")]
    Unavailable,

    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("onnx runtime: {0}")]
    Runtime(String),

    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<usize>),

    #[error("failed to read labels {path}: {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Why a surface reconstruction path gave up.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructError {
    #[error("too few points: {got} (need at least {need})")]
    TooFewPoints { got: usize, need: usize },

    #[error("point cloud has degenerate extent")]
    DegenerateExtent,

    #[error("iso-surface extraction produced no faces")]
    EmptySurface,

    #[error("face {face:?} references a vertex outside 0..{vertex_count}")]
    InvalidFace { face: [u32; 3], vertex_count: usize },

    #[error("triangulation failed: {0}")]
    Triangulation(String),
}

pub type ReconstructResult<T> = std::result::Result<T, ReconstructError>;

/// Writing an artifact failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image encoding: {0}")]
    Image(#[from] image::ImageError),

    #[error("mesh is not exportable: {0}")]
    InvalidMesh(String),
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// The pipeline configuration file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// detect.rs - Object detection capability
//
// The analyzer only needs labels and confidences. Detection is injected so
// the pipeline runs the same with or without a model on disk.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ModelError, ModelResult};
use crate::onnx;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
}

pub trait ObjectDetector {
    fn detect(&self, img: &RgbImage) -> ModelResult<Vec<Detection>>;
}

/// Detector used when no model is configured: sees nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl ObjectDetector for Unavailable {
    fn detect(&self, _img: &RgbImage) -> ModelResult<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// DETR-style set-prediction model: first output is class logits shaped
/// `[1, queries, classes + 1]`, the last class being "no object".
#[derive(Debug, Clone)]
pub struct OnnxDetector {
    model_path: PathBuf,
    labels: Vec<String>,
    input_size: u32,
}

impl OnnxDetector {
    /// `labels_path` is a text file with one class name per line.
    pub fn load(model_path: &Path, labels_path: &Path, input_size: u32) -> ModelResult<Self> {
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        let text = fs::read_to_string(labels_path).map_err(|source| ModelError::Labels {
            path: labels_path.to_path_buf(),
            source,
        })?;
        let labels = text.lines().map(|l| l.trim().to_string()).collect();
        Ok(Self { model_path: model_path.to_path_buf(), labels, input_size })
    }

    fn label(&self, class: usize) -> String {
        self.labels
            .get(class)
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("class_{class}"))
    }
}

impl ObjectDetector for OnnxDetector {
    fn detect(&self, img: &RgbImage) -> ModelResult<Vec<Detection>> {
        let mut session = onnx::open_session(&self.model_path)?;
        info!(model = %self.model_path.display(), "Running object detector");

        let input = onnx::imagenet_tensor(img, self.input_size);
        let (shape, logits) = onnx::run_first_output(&mut session, input, "pixel_values")?;

        let (queries, classes) = match shape.len() {
            3 => (shape[1], shape[2]),
            2 => (shape[0], shape[1]),
            _ => return Err(ModelError::OutputShape(shape)),
        };
        if classes < 2 {
            return Err(ModelError::OutputShape(shape));
        }

        Ok(logits
            .chunks_exact(classes)
            .take(queries)
            .filter_map(|row| {
                let probs = softmax(row);
                // last column is the no-object class
                let (class, &p) = probs[..classes - 1]
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))?;
                Some(Detection { label: self.label(class), confidence: f64::from(p) })
            })
            .collect())
    }
}

fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn unavailable_detects_nothing() {
        let img = RgbImage::new(4, 4);
        assert!(Unavailable.detect(&img).unwrap().is_empty());
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(p.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn load_requires_model_file() {
        let err = OnnxDetector::load(Path::new("/no/such/model.onnx"), Path::new("/no/labels.txt"), 800)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn labels_fall_back_to_class_index() {
        let mut model = tempfile::NamedTempFile::new().unwrap();
        model.write_all(b"not really onnx").unwrap();
        let mut labels = tempfile::NamedTempFile::new().unwrap();
        writeln!(labels, "N/A\nperson\n").unwrap();
        let det = OnnxDetector::load(model.path(), labels.path(), 800).unwrap();
        assert_eq!(det.label(1), "person");
        assert_eq!(det.label(2), "class_2");
        assert_eq!(det.label(99), "class_99");
    }
}

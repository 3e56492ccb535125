// onnx.rs - Shared ONNX Runtime plumbing for the injected models
//
// Sessions are opened per call and dropped afterwards, so model
// capabilities only hold a path and can be shared freely.

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::debug;

use crate::error::{ModelError, ModelResult};

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub(crate) fn open_session(path: &Path) -> ModelResult<Session> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    let builder = Session::builder().map_err(|e| ModelError::Runtime(e.to_string()))?;
    builder
        .commit_from_file(path)
        .map_err(|e| ModelError::Runtime(e.to_string()))
}

/// Resize to `size x size` and lay out as an ImageNet-normalized NCHW tensor.
pub(crate) fn imagenet_tensor(img: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(img, size, size, FilterType::Lanczos3);
    let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, p) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = (f32::from(p[c]) / 255.0 - MEAN[c]) / STD[c];
        }
    }
    input
}

/// Run a single-input model and copy its first output out of the session.
pub(crate) fn run_first_output(
    session: &mut Session,
    input: Array4<f32>,
    default_input: &str,
) -> ModelResult<(Vec<usize>, Vec<f32>)> {
    let input_val = Value::from_array(input).map_err(|e| ModelError::Runtime(e.to_string()))?;
    let input_name = session
        .inputs
        .first()
        .map(|i| i.name.clone())
        .unwrap_or_else(|| default_input.into());
    let outputs = session
        .run(ort::inputs![input_name => input_val])
        .map_err(|e| ModelError::Runtime(e.to_string()))?;
    let arr = outputs[0]
        .try_extract_array::<f32>()
        .map_err(|e| ModelError::Runtime(e.to_string()))?;

    let shape = arr.shape().to_vec();
    debug!(?shape, "Model output");
    Ok((shape, arr.iter().copied().collect()))
}

// model.rs - Monocular depth model capability (MiDaS / DPT)
//
// Runs an ONNX depth model on the letterboxed image and maps the prediction
// back onto the original pixel grid. Output is relative inverse depth:
// larger means nearer, on whatever scale the model produces.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::preprocess_for_depth;
use crate::error::{ModelError, ModelResult};
use crate::onnx;
use crate::raster::GrayF32;

pub trait DepthModel {
    /// Raw prediction resampled to the image's `width x height`.
    fn predict(&self, img: &RgbImage) -> ModelResult<GrayF32>;
}

/// Stand-in when no depth model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl DepthModel for Unavailable {
    fn predict(&self, _img: &RgbImage) -> ModelResult<GrayF32> {
        Err(ModelError::Unavailable)
    }
}

#[derive(Debug, Clone)]
pub struct OnnxDepthModel {
    model_path: PathBuf,
    input_size: u32,
}

impl OnnxDepthModel {
    pub fn new(model_path: impl AsRef<Path>, input_size: u32) -> Self {
        Self { model_path: model_path.as_ref().to_path_buf(), input_size }
    }
}

impl DepthModel for OnnxDepthModel {
    fn predict(&self, img: &RgbImage) -> ModelResult<GrayF32> {
        let mut session = onnx::open_session(&self.model_path)?;
        info!(model = %self.model_path.display(), size = self.input_size, "Running depth model");

        let boxed = preprocess_for_depth(img, self.input_size);
        let input = onnx::imagenet_tensor(&boxed.image, self.input_size);
        let (shape, flat) = onnx::run_first_output(&mut session, input, "image")?;

        // Extract output dimensions
        let (oh, ow) = match shape.len() {
            4 => (shape[2], shape[3]),
            3 => (shape[1], shape[2]),
            2 => (shape[0], shape[1]),
            _ => return Err(ModelError::OutputShape(shape)),
        };
        if oh == 0 || ow == 0 || flat.len() < oh * ow {
            return Err(ModelError::OutputShape(shape));
        }
        let pred = GrayF32 { w: ow, h: oh, data: flat[..oh * ow].to_vec() };

        // Crop the letterbox padding away before going back to image size
        let size = self.input_size as f32;
        let (sx, sy) = (ow as f32 / size, oh as f32 / size);
        let x0 = (boxed.pad_x as f32 * sx) as usize;
        let y0 = (boxed.pad_y as f32 * sy) as usize;
        let cw = ((boxed.content_width as f32 * sx).round() as usize).clamp(1, ow - x0.min(ow - 1));
        let ch = ((boxed.content_height as f32 * sy).round() as usize).clamp(1, oh - y0.min(oh - 1));
        let content = GrayF32::from_fn(cw, ch, |x, y| pred.get((x0 + x).min(ow - 1), (y0 + y).min(oh - 1)));

        let (w, h) = img.dimensions();
        Ok(content.resize_bilinear(w as usize, h as usize))
    }
}

//! ArcFace descriptor extraction via ONNX Runtime.
//!
//! Takes a square crop around a detected face, resizes it to 112x112, and
//! returns the L2-normalized 512-d embedding.

use crate::analyzer::AnalyzerError;
use crate::types::{Descriptor, FaceRegion};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: u32 = 112;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;
/// Descriptor length of the w600k_r50 model.
pub const ARCFACE_DESCRIPTOR_LEN: usize = 512;

pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    pub fn load(model_path: &Path) -> Result<Self, AnalyzerError> {
        if !model_path.exists() {
            return Err(AnalyzerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;
        tracing::info!(path = %model_path.display(), "loaded ArcFace model");

        Ok(Self { session })
    }

    pub fn embed(&mut self, image: &RgbImage, face: &FaceRegion) -> Result<Descriptor, AnalyzerError> {
        let crop = square_crop(image, face);
        let input = to_input_tensor(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_DESCRIPTOR_LEN {
            return Err(AnalyzerError::InferenceFailed(format!(
                "expected {ARCFACE_DESCRIPTOR_LEN}-d embedding, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::new(raw.to_vec()).l2_normalized())
    }
}

/// Crop the smallest square covering `face`, clamped to the image, resized
/// to the model input size.
fn square_crop(image: &RgbImage, face: &FaceRegion) -> RgbImage {
    let (img_w, img_h) = (image.width().max(1), image.height().max(1));
    let side = face.width.max(face.height).max(1.0);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).clamp(0.0, (img_w - 1) as f32) as u32;
    let y0 = (cy - side / 2.0).clamp(0.0, (img_h - 1) as f32) as u32;
    let w = (side as u32).clamp(1, img_w - x0);
    let h = (side as u32).clamp(1, img_h - y0);

    let cropped = imageops::crop_imm(image, x0, y0, w, h).to_image();
    imageops::resize(&cropped, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
}

fn to_input_tensor(crop: &RgbImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    tensor
}

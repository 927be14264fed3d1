//! [`FaceAnalyzer`] backed by SCRFD detection and ArcFace embedding.

use crate::analyzer::{AnalyzerError, AnalyzerFactory, FaceAnalyzer};
use crate::arcface::{ArcFaceEmbedder, ARCFACE_DESCRIPTOR_LEN};
use crate::scrfd::ScrfdDetector;
use crate::types::DetectedFace;
use std::path::{Path, PathBuf};

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

pub struct OnnxFaceAnalyzer {
    detector: ScrfdDetector,
    embedder: ArcFaceEmbedder,
}

impl OnnxFaceAnalyzer {
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: ScrfdDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?,
            embedder: ArcFaceEmbedder::load(&model_dir.join(ARCFACE_MODEL_FILE))?,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn descriptor_len(&self) -> usize {
        ARCFACE_DESCRIPTOR_LEN
    }

    fn detect(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let rgb = image::load_from_memory(image)
            .map_err(|e| AnalyzerError::InvalidImage(e.to_string()))?
            .to_rgb8();

        let regions = self.detector.detect(&rgb)?;
        regions
            .into_iter()
            .map(|region| {
                let descriptor = self.embedder.embed(&rgb, &region)?;
                Ok(DetectedFace { descriptor, region })
            })
            .collect()
    }
}

/// Loads a fresh [`OnnxFaceAnalyzer`] from a model directory on demand.
#[derive(Debug, Clone)]
pub struct OnnxAnalyzerFactory {
    model_dir: PathBuf,
}

impl OnnxAnalyzerFactory {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Whether both model files are present.
    pub fn models_present(&self) -> bool {
        self.model_dir.join(SCRFD_MODEL_FILE).exists()
            && self.model_dir.join(ARCFACE_MODEL_FILE).exists()
    }
}

impl AnalyzerFactory for OnnxAnalyzerFactory {
    fn create(&self) -> Result<Box<dyn FaceAnalyzer>, AnalyzerError> {
        Ok(Box::new(OnnxFaceAnalyzer::load(&self.model_dir)?))
    }

    fn descriptor_len(&self) -> usize {
        ARCFACE_DESCRIPTOR_LEN
    }
}

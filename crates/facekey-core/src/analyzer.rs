//! The face analysis capability consumed by enrollment and verification.
//!
//! An analyzer finds every face in an image and returns one descriptor per
//! face. Orchestration only depends on this trait, so any backend producing
//! comparable descriptors can be substituted.

use crate::types::DetectedFace;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("image file {path} could not be read: {reason}")]
    ReadImage { path: String, reason: String },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detects faces and extracts their descriptors.
///
/// Instances may hold per-session inference state and are used by one
/// request at a time.
pub trait FaceAnalyzer: Send {
    /// Length of every descriptor this analyzer produces.
    fn descriptor_len(&self) -> usize;

    /// Analyze an encoded image (JPEG, PNG, ...).
    fn detect(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, AnalyzerError>;

    /// Analyze an image stored in a local file.
    fn detect_from_path(&mut self, path: &Path) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let bytes = std::fs::read(path).map_err(|e| AnalyzerError::ReadImage {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.detect(&bytes)
    }
}

/// Builds analyzer instances, one per engine worker.
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FaceAnalyzer>, AnalyzerError>;

    fn descriptor_len(&self) -> usize;
}

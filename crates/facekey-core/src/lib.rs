//! facekey-core: descriptors, matching, and face analysis.
//!
//! Face analysis is a capability trait ([`FaceAnalyzer`]); the shipped
//! backend runs SCRFD detection and ArcFace embedding via ONNX Runtime.

pub mod analyzer;
pub mod arcface;
pub mod codec;
pub mod matcher;
pub mod onnx;
pub mod scrfd;
pub mod types;

pub use analyzer::{AnalyzerError, AnalyzerFactory, FaceAnalyzer};
pub use codec::{CodecError, DescriptorCodec};
pub use matcher::{HalfSquaredMatcher, Matcher, MatcherError};
pub use onnx::{OnnxAnalyzerFactory, OnnxFaceAnalyzer};
pub use types::{Descriptor, DetectedFace, FaceRegion, MatchResult, SampleMatch};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facekey/models`, falling back to
/// `~/.local/share/facekey/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facekey/models")
}

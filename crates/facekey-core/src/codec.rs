//! Durable string form of a descriptor, as stored on the user profile.
//!
//! The encoding is a JSON array of numbers. `serde_json` writes the shortest
//! representation that parses back to the identical `f32`, so the encoding
//! is lossless and deterministic.

use crate::types::Descriptor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("descriptor has non-finite component at index {0}")]
    NonFinite(usize),
    #[error("descriptor serialization failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored descriptor is not a numeric array: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("stored descriptor has {actual} components, expected {expected}")]
    WrongArity { expected: usize, actual: usize },
}

/// Encoder/decoder bound to one model's descriptor length.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorCodec {
    dim: usize,
}

impl DescriptorCodec {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn encode(&self, descriptor: &Descriptor) -> Result<String, CodecError> {
        // serde_json writes NaN/inf as `null`, which would not decode again.
        if let Some(idx) = descriptor.values().iter().position(|v| !v.is_finite()) {
            return Err(CodecError::NonFinite(idx));
        }
        serde_json::to_string(descriptor).map_err(CodecError::Encode)
    }

    pub fn decode(&self, encoded: &str) -> Result<Descriptor, CodecError> {
        let descriptor: Descriptor =
            serde_json::from_str(encoded.trim()).map_err(CodecError::Malformed)?;
        if descriptor.len() != self.dim {
            return Err(CodecError::WrongArity {
                expected: self.dim,
                actual: descriptor.len(),
            });
        }
        Ok(descriptor)
    }
}

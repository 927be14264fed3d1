use facekey_core::{AnalyzerError, CodecError, MatcherError};
use facekey_store::{BlobError, ProfileError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which image a detection-cardinality error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The photo supplied with the request.
    Uploaded,
    /// The enrolled reference photo fetched from the blob store.
    Reference,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Uploaded => f.write_str("uploaded image"),
            ImageRole::Reference => f.write_str("base image"),
        }
    }
}

/// Stable error classification for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    NoFaceDetected,
    MultipleFacesDetected,
    DecodeFailed,
    StoreUnavailable,
    PersistFailed,
    InternalFault,
}

impl ErrorKind {
    /// Suggested HTTP status for a transport layer.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidInput
            | ErrorKind::NoFaceDetected
            | ErrorKind::MultipleFacesDetected => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::StoreUnavailable => 502,
            ErrorKind::DecodeFailed | ErrorKind::PersistFailed | ErrorKind::InternalFault => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NoFaceDetected => "NoFaceDetected",
            ErrorKind::MultipleFacesDetected => "MultipleFacesDetected",
            ErrorKind::DecodeFailed => "DecodeFailed",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
            ErrorKind::PersistFailed => "PersistFailed",
            ErrorKind::InternalFault => "InternalFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum FaceKeyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("user with username {0} not found")]
    UserNotFound(String),
    #[error("user {0} does not have a face key image")]
    NoEnrolledImage(String),
    #[error("no faces found in the {0}")]
    NoFaceDetected(ImageRole),
    #[error("multiple faces ({count}) found in the {image}")]
    MultipleFacesDetected { image: ImageRole, count: usize },
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("blob store: {0}")]
    Blob(#[from] BlobError),
    #[error("profile lookup failed: {0}")]
    ProfileLookup(#[source] ProfileError),
    #[error("error saving user embedding: {0}")]
    PersistFailed(#[source] ProfileError),
    #[error("error converting embedding to string: {0}")]
    EncodeFailed(#[source] CodecError),
    #[error("error converting stored embedding to descriptor: {0}")]
    DecodeFailed(#[source] CodecError),
    #[error("descriptor comparison failed: {0}")]
    Matcher(#[from] MatcherError),
    #[error("engine unavailable: {0}")]
    Engine(String),
}

impl FaceKeyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FaceKeyError::InvalidInput(_) => ErrorKind::InvalidInput,
            FaceKeyError::UserNotFound(_) | FaceKeyError::NoEnrolledImage(_) => ErrorKind::NotFound,
            FaceKeyError::NoFaceDetected(_) => ErrorKind::NoFaceDetected,
            FaceKeyError::MultipleFacesDetected { .. } => ErrorKind::MultipleFacesDetected,
            FaceKeyError::Analyzer(AnalyzerError::InvalidImage(_)) => ErrorKind::InvalidInput,
            FaceKeyError::Analyzer(_) => ErrorKind::InternalFault,
            FaceKeyError::Blob(BlobError::InvalidName(_)) => ErrorKind::InvalidInput,
            FaceKeyError::Blob(BlobError::LocalWriteFailed { .. }) => ErrorKind::InternalFault,
            FaceKeyError::Blob(_) => ErrorKind::StoreUnavailable,
            FaceKeyError::ProfileLookup(_) => ErrorKind::StoreUnavailable,
            FaceKeyError::PersistFailed(_) => ErrorKind::PersistFailed,
            FaceKeyError::DecodeFailed(_) => ErrorKind::DecodeFailed,
            FaceKeyError::EncodeFailed(_)
            | FaceKeyError::Matcher(_)
            | FaceKeyError::Engine(_) => ErrorKind::InternalFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_kinds() {
        assert_eq!(FaceKeyError::UserNotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(FaceKeyError::NoEnrolledImage("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            FaceKeyError::Blob(BlobError::Unavailable).kind(),
            ErrorKind::StoreUnavailable
        );
        assert_eq!(
            FaceKeyError::Blob(BlobError::DeleteFailed {
                path: "p".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "gone"),
            })
            .kind(),
            ErrorKind::StoreUnavailable
        );
        assert_eq!(
            FaceKeyError::Analyzer(AnalyzerError::InvalidImage("bad".into())).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            FaceKeyError::PersistFailed(ProfileError::Poisoned).kind(),
            ErrorKind::PersistFailed
        );
    }

    #[test]
    fn test_messages_name_the_image() {
        let err = FaceKeyError::MultipleFacesDetected { image: ImageRole::Reference, count: 2 };
        assert_eq!(err.to_string(), "multiple faces (2) found in the base image");
        assert_eq!(
            FaceKeyError::NoFaceDetected(ImageRole::Uploaded).to_string(),
            "no faces found in the uploaded image"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::MultipleFacesDetected.status_code(), 400);
        assert_eq!(ErrorKind::PersistFailed.status_code(), 500);
    }
}

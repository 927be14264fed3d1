use crate::error::{FaceKeyError, ImageRole};
use crate::locks::UsernameLocks;
use chrono::{DateTime, Utc};
use facekey_core::{DetectedFace, FaceAnalyzer};
use facekey_store::{BlobStore, ProfileStore, UserProfile};
use std::sync::Arc;

/// Threshold applied when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Order of the final enrollment steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrollOrdering {
    /// Delete the previous photo, then persist. A delete failure aborts
    /// before the profile is touched.
    #[default]
    DeleteThenPersist,
    /// Persist first, then delete the previous photo. A persist failure
    /// removes the freshly uploaded photo instead.
    PersistThenCleanup,
}

impl std::str::FromStr for EnrollOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete-then-persist" => Ok(EnrollOrdering::DeleteThenPersist),
            "persist-then-cleanup" => Ok(EnrollOrdering::PersistThenCleanup),
            other => Err(format!("unknown enroll ordering {other:?}")),
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Collaborators and settings shared by every request.
///
/// Holds no per-request state; workers share one instance.
#[derive(Clone)]
pub struct FaceKeyContext {
    pub profiles: Arc<dyn ProfileStore>,
    pub blobs: BlobStore,
    pub default_threshold: f32,
    pub ordering: EnrollOrdering,
    pub locks: UsernameLocks,
    pub clock: Clock,
}

impl FaceKeyContext {
    pub fn new(profiles: Arc<dyn ProfileStore>, blobs: BlobStore) -> Self {
        Self {
            profiles,
            blobs,
            default_threshold: DEFAULT_THRESHOLD,
            ordering: EnrollOrdering::default(),
            locks: UsernameLocks::new(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_default_threshold(mut self, threshold: f32) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn with_ordering(mut self, ordering: EnrollOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn resolve_threshold(&self, threshold: Option<f32>) -> Result<f32, FaceKeyError> {
        match threshold {
            None => Ok(self.default_threshold),
            Some(t) if t.is_finite() => Ok(t),
            Some(t) => Err(FaceKeyError::InvalidInput(format!(
                "threshold must be a finite number, got {t}"
            ))),
        }
    }

    pub(crate) fn load_profile(&self, username: &str) -> Result<UserProfile, FaceKeyError> {
        self.profiles
            .find_by_username(username)
            .map_err(FaceKeyError::ProfileLookup)?
            .ok_or_else(|| FaceKeyError::UserNotFound(username.to_string()))
    }
}

/// Parse a caller-supplied threshold string. Blank means "use the default".
pub fn parse_threshold(raw: Option<&str>) -> Result<Option<f32>, FaceKeyError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f32>()
            .ok()
            .filter(|t| t.is_finite())
            .map(Some)
            .ok_or_else(|| FaceKeyError::InvalidInput("threshold must be a valid float".into())),
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), FaceKeyError> {
    if username.trim().is_empty() {
        return Err(FaceKeyError::InvalidInput("username is required".into()));
    }
    // The username becomes part of a blob name.
    if username.contains('/') {
        return Err(FaceKeyError::InvalidInput(format!(
            "username {username:?} must not contain '/'"
        )));
    }
    Ok(())
}

/// Require exactly one face in a detection result.
pub(crate) fn single_face(
    detected: Result<Vec<DetectedFace>, facekey_core::AnalyzerError>,
    role: ImageRole,
) -> Result<DetectedFace, FaceKeyError> {
    let mut faces = detected?;
    match faces.len() {
        0 => Err(FaceKeyError::NoFaceDetected(role)),
        1 => Ok(faces.remove(0)),
        count => Err(FaceKeyError::MultipleFacesDetected { image: role, count }),
    }
}

pub(crate) fn detect_one(
    analyzer: &mut dyn FaceAnalyzer,
    image: &[u8],
    role: ImageRole,
) -> Result<DetectedFace, FaceKeyError> {
    let face = single_face(analyzer.detect(image), role)?;
    tracing::debug!(%role, confidence = face.region.confidence, "single face detected");
    Ok(face)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold(None).unwrap(), None);
        assert_eq!(parse_threshold(Some("  ")).unwrap(), None);
        assert_eq!(parse_threshold(Some("0.45")).unwrap(), Some(0.45));
        assert!(matches!(parse_threshold(Some("abc")), Err(FaceKeyError::InvalidInput(_))));
        assert!(matches!(parse_threshold(Some("NaN")), Err(FaceKeyError::InvalidInput(_))));
    }

    #[test]
    fn test_ordering_from_str() {
        assert_eq!(
            "persist-then-cleanup".parse::<EnrollOrdering>().unwrap(),
            EnrollOrdering::PersistThenCleanup
        );
        assert!("sometimes".parse::<EnrollOrdering>().is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(matches!(validate_username(""), Err(FaceKeyError::InvalidInput(_))));
        assert!(matches!(validate_username("   "), Err(FaceKeyError::InvalidInput(_))));
        assert!(validate_username("j..doe").is_ok());
        assert!(matches!(validate_username("a/b"), Err(FaceKeyError::InvalidInput(_))));
    }
}

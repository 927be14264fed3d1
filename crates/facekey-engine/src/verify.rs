//! Verification of a presented photo against an enrolled face key.
//!
//! Two independent flows: against the stored descriptor (fast), or against
//! the stored reference photo, re-analyzed on demand (slow). Neither touches
//! persisted state.

use crate::context::{detect_one, single_face, validate_username, FaceKeyContext};
use crate::error::{FaceKeyError, ImageRole};
use facekey_core::{DescriptorCodec, FaceAnalyzer, HalfSquaredMatcher, Matcher};
use facekey_store::UserProfile;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub face_key_file: String,
    pub face_key_embedding: String,
}

impl From<UserProfile> for ProfileSummary {
    fn from(p: UserProfile) -> Self {
        Self {
            user_id: p.id,
            username: p.username,
            full_name: p.full_name,
            face_key_file: p.face_image_ref,
            face_key_embedding: p.face_embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verification {
    Matched {
        distance: f32,
        threshold: f32,
        profile: ProfileSummary,
    },
    NotMatched {
        /// Absent when the reference comparison produced no usable score.
        distance: Option<f32>,
        threshold: f32,
    },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Matched { .. })
    }
}

/// Compare `image` against the descriptor stored on the profile.
pub fn verify_by_embedding(
    ctx: &FaceKeyContext,
    analyzer: &mut dyn FaceAnalyzer,
    username: &str,
    image: &[u8],
    threshold: Option<f32>,
) -> Result<Verification, FaceKeyError> {
    validate_username(username)?;
    let threshold = ctx.resolve_threshold(threshold)?;
    let profile = ctx.load_profile(username)?;

    let candidate = detect_one(analyzer, image, ImageRole::Uploaded)?;
    let stored = DescriptorCodec::new(analyzer.descriptor_len())
        .decode(&profile.face_embedding)
        .map_err(FaceKeyError::DecodeFailed)?;

    let matcher = HalfSquaredMatcher;
    let result = matcher.compare(&candidate.descriptor, &stored, threshold)?;
    tracing::info!(
        username,
        distance = result.distance,
        threshold,
        matched = result.matched,
        "verify by embedding"
    );

    Ok(if result.matched {
        Verification::Matched {
            distance: result.distance,
            threshold,
            profile: profile.into(),
        }
    } else {
        Verification::NotMatched {
            distance: Some(result.distance),
            threshold,
        }
    })
}

/// Compare `image` against the enrolled reference photo.
///
/// The reference photo is analyzed first; the candidate is only analyzed
/// once the reference yields exactly one face.
pub fn verify_by_image(
    ctx: &FaceKeyContext,
    analyzer: &mut dyn FaceAnalyzer,
    username: &str,
    image: &[u8],
    threshold: Option<f32>,
) -> Result<Verification, FaceKeyError> {
    validate_username(username)?;
    let threshold = ctx.resolve_threshold(threshold)?;
    let profile = ctx.load_profile(username)?;

    if profile.face_image_ref.is_empty() {
        return Err(FaceKeyError::NoEnrolledImage(profile.username));
    }

    let local = LocalCopy(ctx.blobs.download(&profile.face_image_ref)?);
    let reference = single_face(analyzer.detect_from_path(&local.0), ImageRole::Reference)?;
    drop(local);

    let samples = [reference.descriptor];
    let candidate = detect_one(analyzer, image, ImageRole::Uploaded)?;

    let matcher = HalfSquaredMatcher;
    let hit = matcher.classify_against_samples(&candidate.descriptor, &samples, threshold);
    tracing::info!(
        username,
        reference = %profile.face_image_ref,
        distance = hit.map(|h| h.distance),
        threshold,
        matched = hit.is_some(),
        "verify by image"
    );

    Ok(match hit {
        Some(hit) => Verification::Matched {
            distance: hit.distance,
            threshold,
            profile: profile.into(),
        },
        None => Verification::NotMatched {
            distance: matcher.distance(&candidate.descriptor, &samples[0]).ok(),
            threshold,
        },
    })
}

/// Downloaded reference photo, removed from local disk on drop.
struct LocalCopy(PathBuf);

impl Drop for LocalCopy {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::warn!(path = %self.0.display(), error = %e, "failed to remove downloaded reference");
        }
    }
}

//! Enrollment: bind a username to one face descriptor and reference photo.

use crate::context::{detect_one, validate_username, EnrollOrdering, FaceKeyContext};
use crate::error::{FaceKeyError, ImageRole};
use crate::naming;
use facekey_core::{DescriptorCodec, FaceAnalyzer};
use facekey_store::FaceKeyUpdate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentResult {
    pub user_id: i64,
    pub face_key_file: String,
    pub face_key_embedding: String,
}

/// Enroll `image` as the face key for `username`, replacing any previous one.
///
/// Not transactional: a failure after the upload can leave an orphaned blob.
/// See [`EnrollOrdering`] for which failure leaves what behind.
pub fn enroll(
    ctx: &FaceKeyContext,
    analyzer: &mut dyn FaceAnalyzer,
    username: &str,
    image: &[u8],
) -> Result<EnrollmentResult, FaceKeyError> {
    validate_username(username)?;
    let _guard = ctx.locks.acquire(username);

    let profile = ctx.load_profile(username)?;
    let face = detect_one(analyzer, image, ImageRole::Uploaded)?;

    let name = naming::fresh_blob_name(&profile.username, (ctx.clock)(), image, &profile.face_image_ref);
    ctx.blobs.upload(image, &name)?;

    let codec = DescriptorCodec::new(analyzer.descriptor_len());
    let embedding = codec.encode(&face.descriptor).map_err(FaceKeyError::EncodeFailed)?;

    let update = FaceKeyUpdate {
        face_embedding: embedding.clone(),
        face_image_ref: name.clone(),
    };
    let previous = Some(profile.face_image_ref.as_str()).filter(|old| !old.is_empty());

    match ctx.ordering {
        EnrollOrdering::DeleteThenPersist => {
            if let Some(old) = previous {
                ctx.blobs.delete(old)?;
            }
            ctx.profiles
                .update_face_key(&profile.username, &update)
                .map_err(FaceKeyError::PersistFailed)?;
        }
        EnrollOrdering::PersistThenCleanup => {
            if let Err(e) = ctx.profiles.update_face_key(&profile.username, &update) {
                if let Err(cleanup) = ctx.blobs.delete(&name) {
                    tracing::warn!(blob = %name, error = %cleanup, "failed to remove unreferenced upload");
                }
                return Err(FaceKeyError::PersistFailed(e));
            }
            if let Some(old) = previous {
                if let Err(e) = ctx.blobs.delete(old) {
                    tracing::warn!(blob = %old, error = %e, "failed to remove superseded face key");
                }
            }
        }
    }

    tracing::info!(username, user_id = profile.id, blob = %name, "face key enrolled");
    Ok(EnrollmentResult {
        user_id: profile.id,
        face_key_file: name,
        face_key_embedding: embedding,
    })
}

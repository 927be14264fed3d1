//! Blob names for enrolled reference photos.

use chrono::{DateTime, Duration, Utc};
use image::ImageFormat;

const NAME_SUFFIX: &str = "face_key";

/// `<username>_<unix seconds>_face_key.<ext>`, with `ext` taken from the
/// photo's detected format.
pub fn blob_name(username: &str, now: DateTime<Utc>, image: &[u8]) -> String {
    format!(
        "{username}_{}_{NAME_SUFFIX}.{}",
        now.timestamp(),
        image_extension(image)
    )
}

/// Like [`blob_name`], but never equal to `current`: a same-second
/// re-enrollment moves to the next second so the live photo is not
/// overwritten in place.
pub fn fresh_blob_name(username: &str, now: DateTime<Utc>, image: &[u8], current: &str) -> String {
    let name = blob_name(username, now, image);
    if name != current {
        return name;
    }
    blob_name(username, now + Duration::seconds(1), image)
}

/// Normalized extension for the image's format, `jpeg` when unrecognized.
pub fn image_extension(image: &[u8]) -> &'static str {
    match image::guess_format(image) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::WebP) => "webp",
        Ok(ImageFormat::Bmp) => "bmp",
        Ok(ImageFormat::Gif) => "gif",
        _ => "jpeg",
    }
}

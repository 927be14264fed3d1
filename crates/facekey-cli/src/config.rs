use facekey_engine::{EnrollOrdering, DEFAULT_THRESHOLD};
use serde::Serialize;
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory containing the SCRFD and ArcFace ONNX models.
    pub model_dir: PathBuf,
    /// Path to the SQLite profile database.
    pub db_path: PathBuf,
    /// Blob store root; photos live under `<root>/face_key/`.
    pub blob_root: String,
    /// Local directory for downloaded reference photos.
    pub download_dir: PathBuf,
    /// Match threshold used when a request does not supply one.
    pub threshold: f32,
    /// Number of analyzer worker threads.
    pub workers: usize,
    #[serde(serialize_with = "ordering_name")]
    pub ordering: EnrollOrdering,
}

impl Config {
    /// Load configuration from `FACEKEY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEKEY_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facekey_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facekey");

        let db_path = std::env::var("FACEKEY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("profiles.db"));

        let ordering = match std::env::var("FACEKEY_ENROLL_ORDERING") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring FACEKEY_ENROLL_ORDERING");
                EnrollOrdering::default()
            }),
            Err(_) => EnrollOrdering::default(),
        };

        Self {
            model_dir,
            db_path,
            blob_root: std::env::var("FACEKEY_BLOB_ROOT").unwrap_or_else(|_| "/upload/facekey/".to_string()),
            download_dir: std::env::var("FACEKEY_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("facekey")),
            threshold: env_f32("FACEKEY_THRESHOLD", DEFAULT_THRESHOLD),
            workers: env_usize("FACEKEY_WORKERS", 2),
            ordering,
        }
    }
}

fn ordering_name<S: serde::Serializer>(ordering: &EnrollOrdering, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match ordering {
        EnrollOrdering::DeleteThenPersist => "delete-then-persist",
        EnrollOrdering::PersistThenCleanup => "persist-then-cleanup",
    })
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

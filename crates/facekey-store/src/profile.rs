//! User profile records.
//!
//! The profile store is owned by the wider application; facekey reads
//! profiles by username and writes only the two face-key fields.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("no profile for username {0:?}")]
    NotFound(String),
    #[error("username {0:?} already exists")]
    Duplicate(String),
    #[error("failed to create database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile store lock poisoned")]
    Poisoned,
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    /// Encoded descriptor, empty when not enrolled.
    pub face_embedding: String,
    /// Blob name of the reference photo, empty when not enrolled.
    pub face_image_ref: String,
}

impl UserProfile {
    pub fn is_enrolled(&self) -> bool {
        !self.face_embedding.is_empty() && !self.face_image_ref.is_empty()
    }
}

/// The face-key fields, always written together.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceKeyUpdate {
    pub face_embedding: String,
    pub face_image_ref: String,
}

/// Lookup/update collaborator for user profiles.
pub trait ProfileStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<UserProfile>, ProfileError>;

    /// Set both face-key fields in a single update.
    fn update_face_key(&self, username: &str, update: &FaceKeyUpdate) -> Result<(), ProfileError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT NOT NULL UNIQUE,
    full_name      TEXT NOT NULL DEFAULT '',
    face_embedding TEXT NOT NULL DEFAULT '',
    face_image_ref TEXT NOT NULL DEFAULT ''
);
";

/// SQLite-backed profile store.
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: &Path) -> Result<Self, ProfileError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| ProfileError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "profile database opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, ProfileError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ProfileError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ProfileError> {
        self.conn.lock().map_err(|_| ProfileError::Poisoned)
    }

    /// Insert a new, unenrolled profile.
    pub fn create_user(&self, username: &str, full_name: &str) -> Result<UserProfile, ProfileError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, full_name) VALUES (?1, ?2)
             ON CONFLICT(username) DO NOTHING",
            params![username, full_name],
        )?;
        if inserted == 0 {
            return Err(ProfileError::Duplicate(username.to_string()));
        }
        let id = conn.last_insert_rowid();
        tracing::info!(id, username, "profile created");
        Ok(UserProfile {
            id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            face_embedding: String::new(),
            face_image_ref: String::new(),
        })
    }
}

impl ProfileStore for SqliteProfileStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserProfile>, ProfileError> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT id, username, full_name, face_embedding, face_image_ref
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        full_name: row.get(2)?,
                        face_embedding: row.get(3)?,
                        face_image_ref: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn update_face_key(&self, username: &str, update: &FaceKeyUpdate) -> Result<(), ProfileError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET face_embedding = ?1, face_image_ref = ?2 WHERE username = ?3",
            params![update.face_embedding, update.face_image_ref, username],
        )?;
        if changed == 0 {
            return Err(ProfileError::NotFound(username.to_string()));
        }
        tracing::debug!(username, image_ref = %update.face_image_ref, "face key persisted");
        Ok(())
    }
}

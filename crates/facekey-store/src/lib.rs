//! facekey-store: adapters for the collaborators facekey persists through.
//!
//! The blob store holds reference photos on a remote file store; the profile
//! store holds the user records that carry the encoded descriptor.

pub mod blob;
pub mod profile;

pub use blob::{BlobError, BlobStore, FsOp, LocalFs, MemoryFs, RemoteFs, BLOB_PREFIX};
pub use profile::{FaceKeyUpdate, ProfileError, ProfileStore, SqliteProfileStore, UserProfile};

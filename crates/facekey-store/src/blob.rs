//! Reference-photo blob store.
//!
//! Blobs live under `<root>/face_key/<name>` on a remote file store. The
//! remote side is a [`RemoteFs`] capability; [`BlobStore`] maps logical
//! names onto it and classifies failures.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Fixed sub-prefix under the configured root.
pub const BLOB_PREFIX: &str = "face_key";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob store is not connected")]
    Unavailable,
    #[error("invalid blob name {0:?}")]
    InvalidName(String),
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete {path}: {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write local copy {}: {source}", path.display())]
    LocalWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list {path}: {source}")]
    ListFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Minimal remote file-store capability.
///
/// Paths are remote paths with `/` separators.
pub trait RemoteFs: Send + Sync {
    /// Create or truncate `path` and write `content` to it.
    fn create(&self, path: &str, content: &[u8]) -> io::Result<()>;
    fn open(&self, path: &str) -> io::Result<Vec<u8>>;
    fn remove(&self, path: &str) -> io::Result<()>;
    /// Entry names (not full paths) directly under `dir`.
    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>>;
}

/// Remote store exposed as a locally mounted directory tree (sshfs, NFS,
/// or a plain local directory).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl RemoteFs for LocalFs {
    fn create(&self, path: &str, content: &[u8]) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn open(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// Remote operation kinds, for failure injection on [`MemoryFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Create,
    Open,
    Remove,
    ReadDir,
}

/// In-memory remote store with per-operation counters. Used in tests and
/// dry runs.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<FsOp>>,
    creates: AtomicUsize,
    removes: AtomicUsize,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail until [`MemoryFs::heal`] is called.
    pub fn fail(&self, op: FsOp) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert(op);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Successful and failed `create` calls so far.
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Successful and failed `remove` calls so far.
    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, op: FsOp) -> io::Result<()> {
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(&op) {
            return Err(io::Error::new(io::ErrorKind::Other, format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl RemoteFs for MemoryFs {
    fn create(&self, path: &str, content: &[u8]) -> io::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check(FsOp::Create)?;
        self.files().insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn open(&self, path: &str) -> io::Result<Vec<u8>> {
        self.check(FsOp::Open)?;
        self.files()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file does not exist"))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.check(FsOp::Remove)?;
        self.files()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file does not exist"))
    }

    fn read_dir(&self, dir: &str) -> io::Result<Vec<String>> {
        self.check(FsOp::ReadDir)?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files()
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}

static DOWNLOAD_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Logical-name view over a [`RemoteFs`].
#[derive(Clone)]
pub struct BlobStore {
    remote: Option<Arc<dyn RemoteFs>>,
    root: String,
    download_dir: PathBuf,
}

impl BlobStore {
    pub fn connect(remote: Arc<dyn RemoteFs>, root: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote: Some(remote),
            root: root.into(),
            download_dir: download_dir.into(),
        }
    }

    /// A store whose remote connection was never established. Every
    /// operation fails with [`BlobError::Unavailable`].
    pub fn disconnected(root: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote: None,
            root: root.into(),
            download_dir: download_dir.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.remote.is_some()
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Remote directory holding every blob.
    pub fn dir(&self) -> String {
        format!("{}/{BLOB_PREFIX}", self.root.trim_end_matches('/'))
    }

    pub fn path_for(&self, name: &str) -> String {
        format!("{}/{name}", self.dir())
    }

    /// Store `content` as `name`, returning the remote path. A failed write
    /// may leave a partial remote file behind.
    pub fn upload(&self, content: &[u8], name: &str) -> Result<String, BlobError> {
        validate_name(name)?;
        let remote = self.remote()?;
        let path = self.path_for(name);
        remote
            .create(&path, content)
            .map_err(|source| BlobError::WriteFailed { path: path.clone(), source })?;
        tracing::info!(path = %path, bytes = content.len(), "blob uploaded");
        Ok(path)
    }

    /// Remove `name`. Removing a name that does not exist is an error.
    pub fn delete(&self, name: &str) -> Result<(), BlobError> {
        validate_name(name)?;
        let remote = self.remote()?;
        let path = self.path_for(name);
        remote
            .remove(&path)
            .map_err(|source| BlobError::DeleteFailed { path: path.clone(), source })?;
        tracing::info!(path = %path, "blob deleted");
        Ok(())
    }

    /// Fetch `name` into a fresh file under the download directory and
    /// return its local path. The caller owns and removes that file.
    pub fn download(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_name(name)?;
        let remote = self.remote()?;
        let path = self.path_for(name);
        let content = remote
            .open(&path)
            .map_err(|source| BlobError::ReadFailed { path: path.clone(), source })?;

        std::fs::create_dir_all(&self.download_dir).map_err(|source| BlobError::LocalWriteFailed {
            path: self.download_dir.clone(),
            source,
        })?;
        let seq = DOWNLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
        let local = self
            .download_dir
            .join(format!("{}-{seq}-{name}", std::process::id()));
        std::fs::write(&local, &content).map_err(|source| BlobError::LocalWriteFailed {
            path: local.clone(),
            source,
        })?;
        tracing::debug!(remote = %path, local = %local.display(), "blob downloaded");
        Ok(local)
    }

    /// Names of all stored blobs, sorted.
    pub fn list(&self) -> Result<Vec<String>, BlobError> {
        let remote = self.remote()?;
        let dir = self.dir();
        let mut names = remote
            .read_dir(&dir)
            .map_err(|source| BlobError::ListFailed { path: dir, source })?;
        names.sort();
        Ok(names)
    }

    fn remote(&self) -> Result<&dyn RemoteFs, BlobError> {
        self.remote.as_deref().ok_or(BlobError::Unavailable)
    }
}

fn validate_name(name: &str) -> Result<(), BlobError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(BlobError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("facekey-blob-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn memory_store(tag: &str) -> (Arc<MemoryFs>, BlobStore) {
        let fs = Arc::new(MemoryFs::new());
        let store = BlobStore::connect(fs.clone(), "/upload/facekey/", temp_dir(tag));
        (fs, store)
    }

    #[test]
    fn test_path_layout() {
        let (_, store) = memory_store("layout");
        assert_eq!(store.path_for("a.jpeg"), "/upload/facekey/face_key/a.jpeg");
        let bare = BlobStore::disconnected("/srv/blobs", "/tmp");
        assert_eq!(bare.path_for("a.jpeg"), "/srv/blobs/face_key/a.jpeg");
    }

    #[test]
    fn test_upload_then_list() {
        let (fs, store) = memory_store("list");
        let path = store.upload(b"one", "b.jpeg").unwrap();
        store.upload(b"two", "a.jpeg").unwrap();
        assert_eq!(path, "/upload/facekey/face_key/b.jpeg");
        assert_eq!(store.list().unwrap(), vec!["a.jpeg", "b.jpeg"]);
        assert_eq!(fs.create_calls(), 2);
    }

    #[test]
    fn test_disconnected_store_is_unavailable() {
        let store = BlobStore::disconnected("/upload", "/tmp");
        assert!(matches!(store.upload(b"x", "a.jpeg"), Err(BlobError::Unavailable)));
        assert!(matches!(store.delete("a.jpeg"), Err(BlobError::Unavailable)));
        assert!(matches!(store.download("a.jpeg"), Err(BlobError::Unavailable)));
        assert!(matches!(store.list(), Err(BlobError::Unavailable)));
    }

    #[test]
    fn test_write_failure_carries_path() {
        let (fs, store) = memory_store("writefail");
        fs.fail(FsOp::Create);
        let err = store.upload(b"x", "a.jpeg").unwrap_err();
        assert!(matches!(err, BlobError::WriteFailed { ref path, .. } if path.ends_with("face_key/a.jpeg")));
        assert!(err.to_string().contains("injected"));
    }

    #[test]
    fn test_delete_missing_is_error() {
        let (_, store) = memory_store("delmissing");
        assert!(matches!(store.delete("never.jpeg"), Err(BlobError::DeleteFailed { .. })));
    }

    #[test]
    fn test_delete_removes() {
        let (fs, store) = memory_store("delete");
        store.upload(b"x", "a.jpeg").unwrap();
        store.delete("a.jpeg").unwrap();
        assert!(fs.paths().is_empty());
        assert_eq!(fs.remove_calls(), 1);
    }

    #[test]
    fn test_download_writes_local_copy() {
        let (_, store) = memory_store("download");
        store.upload(b"photo-bytes", "alice.jpeg").unwrap();
        let local = store.download("alice.jpeg").unwrap();
        assert!(local.starts_with(store.download_dir()));
        assert_eq!(std::fs::read(&local).unwrap(), b"photo-bytes");
        std::fs::remove_file(local).unwrap();
    }

    #[test]
    fn test_download_missing_is_read_failure() {
        let (_, store) = memory_store("dlmissing");
        assert!(matches!(store.download("nope.jpeg"), Err(BlobError::ReadFailed { .. })));
    }

    #[test]
    fn test_list_failure() {
        let (fs, store) = memory_store("listfail");
        fs.fail(FsOp::ReadDir);
        assert!(matches!(store.list(), Err(BlobError::ListFailed { .. })));
        fs.heal();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_names_rejected_before_remote() {
        let (fs, store) = memory_store("names");
        for name in ["", ".", "..", "../etc/passwd", "a/b.jpeg"] {
            assert!(matches!(store.upload(b"x", name), Err(BlobError::InvalidName(_))), "{name}");
        }
        assert_eq!(fs.create_calls(), 0);
    }

    #[test]
    fn test_dotted_names_accepted() {
        let (fs, store) = memory_store("dotted");
        store.upload(b"x", "j..doe_1700000000_face_key.jpeg").unwrap();
        store.upload(b"y", "..hidden.jpeg").unwrap();
        assert_eq!(
            store.list().unwrap(),
            vec!["..hidden.jpeg", "j..doe_1700000000_face_key.jpeg"]
        );
        assert_eq!(fs.create_calls(), 2);
    }

    #[test]
    fn test_local_fs_roundtrip() {
        let root = temp_dir("localfs");
        std::fs::create_dir_all(root.join(BLOB_PREFIX)).unwrap();
        let store = BlobStore::connect(Arc::new(LocalFs), root.to_string_lossy(), root.join("dl"));

        store.upload(b"abc", "x.png").unwrap();
        assert_eq!(store.list().unwrap(), vec!["x.png"]);
        let local = store.download("x.png").unwrap();
        assert_eq!(std::fs::read(local).unwrap(), b"abc");
        store.delete("x.png").unwrap();
        assert!(store.list().unwrap().is_empty());

        std::fs::remove_dir_all(root).unwrap();
    }
}

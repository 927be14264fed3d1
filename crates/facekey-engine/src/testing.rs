//! Fakes shared by the engine's unit tests.

use crate::context::FaceKeyContext;
use chrono::{DateTime, TimeZone, Utc};
use facekey_core::{AnalyzerError, AnalyzerFactory, Descriptor, DetectedFace, FaceAnalyzer, FaceRegion};
use facekey_store::{BlobStore, FaceKeyUpdate, MemoryFs, ProfileError, ProfileStore, UserProfile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIM: usize = 4;

pub const ALICE_PHOTO: &[u8] = b"alice-photo";
pub const ALICE_AGAIN: &[u8] = b"alice-again";
pub const STRANGER: &[u8] = b"stranger";
pub const GROUP_PHOTO: &[u8] = b"group-photo";
pub const EMPTY_ROOM: &[u8] = b"empty-room";
/// One face whose descriptor cannot be encoded.
pub const CORRUPT_DESCRIPTOR: &[u8] = b"corrupt-descriptor";

pub fn alice_descriptor() -> Descriptor {
    Descriptor::new(vec![1.0, 0.0, 0.0, 0.0])
}

fn face(values: [f32; DIM]) -> DetectedFace {
    DetectedFace {
        descriptor: Descriptor::new(values.to_vec()),
        region: FaceRegion { x: 10.0, y: 10.0, width: 80.0, height: 80.0, confidence: 0.95 },
    }
}

/// Analyzer that answers from a fixed table keyed by image bytes.
#[derive(Clone)]
pub struct ScriptedAnalyzer {
    table: Arc<HashMap<Vec<u8>, Vec<DetectedFace>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(ALICE_PHOTO.to_vec(), vec![face([1.0, 0.0, 0.0, 0.0])]);
        table.insert(ALICE_AGAIN.to_vec(), vec![face([0.96, 0.28, 0.0, 0.0])]);
        table.insert(STRANGER.to_vec(), vec![face([0.0, 0.0, 1.0, 0.0])]);
        table.insert(
            GROUP_PHOTO.to_vec(),
            vec![face([1.0, 0.0, 0.0, 0.0]), face([0.0, 1.0, 0.0, 0.0])],
        );
        table.insert(EMPTY_ROOM.to_vec(), Vec::new());
        table.insert(CORRUPT_DESCRIPTOR.to_vec(), vec![face([f32::NAN, 0.0, 0.0, 0.0])]);
        Self {
            table: Arc::new(table),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceAnalyzer for ScriptedAnalyzer {
    fn descriptor_len(&self) -> usize {
        DIM
    }

    fn detect(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(image)
            .cloned()
            .ok_or_else(|| AnalyzerError::InvalidImage("unknown test image".into()))
    }
}

impl AnalyzerFactory for ScriptedAnalyzer {
    fn create(&self) -> Result<Box<dyn FaceAnalyzer>, AnalyzerError> {
        Ok(Box::new(self.clone()))
    }

    fn descriptor_len(&self) -> usize {
        DIM
    }
}

/// Profile store over a map, with switchable update failures.
#[derive(Default)]
pub struct MemoryProfiles {
    users: Mutex<HashMap<String, UserProfile>>,
    pub fail_updates: AtomicBool,
    pub updates: AtomicUsize,
}

impl MemoryProfiles {
    pub fn with_user(username: &str) -> Self {
        let store = Self::default();
        store.insert(UserProfile {
            id: 7,
            username: username.to_string(),
            full_name: "Alice Liddell".to_string(),
            face_embedding: String::new(),
            face_image_ref: String::new(),
        });
        store
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.lock().unwrap().insert(profile.username.clone(), profile);
    }

    pub fn get(&self, username: &str) -> UserProfile {
        self.users.lock().unwrap()[username].clone()
    }
}

impl ProfileStore for MemoryProfiles {
    fn find_by_username(&self, username: &str) -> Result<Option<UserProfile>, ProfileError> {
        Ok(self.users.lock().unwrap().get(username).cloned())
    }

    fn update_face_key(&self, username: &str, update: &FaceKeyUpdate) -> Result<(), ProfileError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ProfileError::Poisoned);
        }
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(username)
            .ok_or_else(|| ProfileError::NotFound(username.to_string()))?;
        user.face_embedding = update.face_embedding.clone();
        user.face_image_ref = update.face_image_ref.clone();
        Ok(())
    }
}

/// Clock that advances one second per reading, starting at 1_700_000_000.
pub fn ticking_clock() -> crate::context::Clock {
    let next = Arc::new(AtomicI64::new(1_700_000_000));
    Arc::new(move || -> DateTime<Utc> {
        let secs = next.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).unwrap()
    })
}

pub struct Fixture {
    pub ctx: FaceKeyContext,
    pub fs: Arc<MemoryFs>,
    pub profiles: Arc<MemoryProfiles>,
    pub analyzer: ScriptedAnalyzer,
}

pub fn fixture(tag: &str) -> Fixture {
    let fs = Arc::new(MemoryFs::new());
    let profiles = Arc::new(MemoryProfiles::with_user("alice"));
    let download_dir = std::env::temp_dir().join(format!("facekey-engine-{tag}-{}", std::process::id()));
    let blobs = BlobStore::connect(fs.clone(), "/upload/facekey", download_dir);
    let ctx = FaceKeyContext::new(profiles.clone(), blobs).with_clock(ticking_clock());
    Fixture {
        ctx,
        fs,
        profiles,
        analyzer: ScriptedAnalyzer::new(),
    }
}

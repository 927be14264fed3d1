//! facekey-engine: face-key enrollment and verification.
//!
//! Orchestrates the analyzer, descriptor codec, matcher, blob store and
//! profile store. The synchronous operations in [`mod@enroll`] and
//! [`verify`] take an explicit analyzer; [`engine`] runs them on a pool of
//! worker threads that each own one.

pub mod context;
pub mod engine;
pub mod enroll;
pub mod error;
pub mod locks;
pub mod naming;
pub mod verify;

#[cfg(test)]
mod testing;

pub use context::{parse_threshold, Clock, EnrollOrdering, FaceKeyContext, DEFAULT_THRESHOLD};
pub use engine::{spawn_engine, EngineHandle};
pub use enroll::{enroll, EnrollmentResult};
pub use error::{ErrorKind, FaceKeyError, ImageRole};
pub use locks::{UsernameGuard, UsernameLocks};
pub use verify::{verify_by_embedding, verify_by_image, ProfileSummary, Verification};

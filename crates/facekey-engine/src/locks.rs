//! Per-username mutual exclusion for enrollment.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

/// Set of usernames currently being enrolled in this process.
#[derive(Debug, Clone, Default)]
pub struct UsernameLocks {
    inner: Arc<(Mutex<HashSet<String>>, Condvar)>,
}

impl UsernameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other holder owns `username`, then own it until the
    /// guard drops.
    pub fn acquire(&self, username: &str) -> UsernameGuard {
        let (held, released) = &*self.inner;
        let mut set = held.lock().unwrap_or_else(|e| e.into_inner());
        while set.contains(username) {
            tracing::debug!(username, "waiting for concurrent enrollment");
            set = released.wait(set).unwrap_or_else(|e| e.into_inner());
        }
        set.insert(username.to_string());
        UsernameGuard {
            locks: self.clone(),
            username: username.to_string(),
        }
    }

    #[cfg(test)]
    fn is_held(&self, username: &str) -> bool {
        let (held, _) = &*self.inner;
        held.lock().unwrap_or_else(|e| e.into_inner()).contains(username)
    }
}

pub struct UsernameGuard {
    locks: UsernameLocks,
    username: String,
}

impl Drop for UsernameGuard {
    fn drop(&mut self) {
        let (held, released) = &*self.locks.inner;
        held.lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.username);
        released.notify_all();
    }
}

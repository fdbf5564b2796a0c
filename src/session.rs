//! Session store collaborator.
//!
//! The dispatch core never reads or writes session data itself. It only starts the session
//! for HTTP controllers that want one, and releases the store lock before a file body is
//! streamed so that other requests from the same client are not blocked.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub trait SessionStore: Send + Sync {
    /// Open (or resume) the session of the current request.
    fn start(&self);

    /// Release the store lock while keeping session data readable.
    fn release_lock(&self);

    fn is_active(&self) -> bool;
}

/// Store used when the host has no session support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSession;

impl SessionStore for NullSession {
    fn start(&self) {}

    fn release_lock(&self) {}

    fn is_active(&self) -> bool {
        false
    }
}

/// In-process store that only tracks its own state.
#[derive(Debug, Default)]
pub struct MemorySession {
    active: AtomicBool,
    starts: AtomicUsize,
    releases: AtomicUsize,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times [`SessionStore::start`] ran.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Times the lock was released.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl SessionStore for MemorySession {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    fn release_lock(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_only_counts_active_sessions() {
        let session = MemorySession::new();
        session.release_lock();
        assert_eq!(session.release_count(), 0);

        session.start();
        assert!(session.is_active());
        session.release_lock();
        session.release_lock();
        assert!(!session.is_active());
        assert_eq!(session.release_count(), 1);
        assert_eq!(session.start_count(), 1);
    }
}

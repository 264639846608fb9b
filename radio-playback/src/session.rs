//! Session identity.
//!
//! Every successful `play` gets a fresh [`SessionId`] from a monotonically
//! increasing generation counter. Background tasks carry the id they were
//! started with and compare it against the tracker before acting, so a late
//! task from a previous session can never touch the current one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of one play-until-stop lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Shared record of which session, if any, is active.
///
/// Zero means "none"; ids start at 1.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    next: Arc<AtomicU64>,
    active: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new id and marks it active.
    pub fn begin(&self) -> SessionId {
        let id = self.next.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.store(id, Ordering::Release);
        SessionId(id)
    }

    /// Clears the active session.
    pub fn end(&self) {
        self.active.store(0, Ordering::Release);
    }

    pub fn is_current(&self, id: SessionId) -> bool {
        self.active.load(Ordering::Acquire) == id.0
    }

    pub fn current(&self) -> Option<SessionId> {
        match self.active.load(Ordering::Acquire) {
            0 => None,
            id => Some(SessionId(id)),
        }
    }
}

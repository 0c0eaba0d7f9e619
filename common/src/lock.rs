// Per-post locking: at most one in-flight reschedule decision per post

use crate::models::PostId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Registry of post locks shared by concurrent sweeps.
///
/// Sweeps and any ad-hoc decision path take the same registry, so two
/// overlapping runs can never decide for the same post at the same time.
/// Guards release their post on drop.
#[derive(Debug, Default)]
pub struct PostLockRegistry {
    held: Mutex<HashSet<PostId>>,
}

impl PostLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking acquire; `None` means another decision is in flight
    pub fn try_acquire(self: &Arc<Self>, post_id: PostId) -> Option<PostLockGuard> {
        let mut held = self.lock_held();
        if held.insert(post_id) {
            debug!(post_id, "Post lock acquired");
            Some(PostLockGuard {
                post_id,
                registry: Arc::clone(self),
                acquired_at: Instant::now(),
            })
        } else {
            debug!(post_id, "Post lock already held, skipping");
            None
        }
    }

    pub fn is_held(&self, post_id: PostId) -> bool {
        self.lock_held().contains(&post_id)
    }

    fn release(&self, post_id: PostId) {
        if !self.lock_held().remove(&post_id) {
            warn!(post_id, "Released a post lock that was not held");
        }
    }

    fn lock_held(&self) -> std::sync::MutexGuard<'_, HashSet<PostId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard that releases its post lock when dropped
#[derive(Debug)]
pub struct PostLockGuard {
    post_id: PostId,
    registry: Arc<PostLockRegistry>,
    acquired_at: Instant,
}

impl PostLockGuard {
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    /// Time elapsed since lock acquisition
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for PostLockGuard {
    fn drop(&mut self) {
        self.registry.release(self.post_id);
        debug!(post_id = self.post_id, "Post lock released");
    }
}

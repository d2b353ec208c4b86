//! Per-contact unread counters

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::storage::{self, Namespace, Storage};

/// Unread counts for the current user, persisted like [`ContactRegistry`](crate::contacts::ContactRegistry)
pub struct UnreadTracker {
    user_id: String,
    active_peer: Option<String>,
    counts: HashMap<String, u32>,
    storage: Arc<dyn Storage>,
}

impl UnreadTracker {
    pub fn load(storage: Arc<dyn Storage>, user_id: &str) -> Self {
        let mut tracker = Self {
            user_id: String::new(),
            active_peer: None,
            counts: HashMap::new(),
            storage,
        };
        tracker.switch_user(user_id);
        tracker
    }

    pub fn switch_user(&mut self, user_id: &str) {
        let mut counts: HashMap<String, u32> =
            storage::load_or_default(self.storage.as_ref(), Namespace::Unread, user_id);
        counts.remove(user_id);
        counts.retain(|_, count| *count > 0);

        debug!(user = %user_id, contacts = counts.len(), "Loaded unread counts");
        self.user_id = user_id.to_string();
        self.active_peer = None;
        self.counts = counts;
    }

    /// Mark `peer` as the open conversation and reset its counter
    pub fn set_active(&mut self, peer: Option<&str>) {
        self.active_peer = peer.map(str::to_string);
        if let Some(peer) = peer {
            self.clear(peer);
        }
    }

    /// Add one unread message for `contact_id`
    ///
    /// Skipped for the active peer and for the current user. Returns the new count
    /// when it changed.
    pub fn increment(&mut self, contact_id: &str) -> Option<u32> {
        if contact_id == self.user_id || self.active_peer.as_deref() == Some(contact_id) {
            return None;
        }

        let count = self.counts.entry(contact_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        self.persist();
        Some(count)
    }

    /// Reset `contact_id` to zero; returns `true` if it had unread messages
    pub fn clear(&mut self, contact_id: &str) -> bool {
        if self.counts.remove(contact_id).is_some() {
            self.persist();
            true
        } else {
            false
        }
    }

    pub fn count(&self, contact_id: &str) -> u32 {
        self.counts.get(contact_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn counts(&self) -> &HashMap<String, u32> {
        &self.counts
    }

    fn persist(&self) {
        storage::save(
            self.storage.as_ref(),
            Namespace::Unread,
            &self.user_id,
            &self.counts,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_increment_skips_active_peer_and_self() {
        let mut tracker = UnreadTracker::load(Arc::new(MemoryStorage::new()), "alice");
        tracker.set_active(Some("bob"));

        assert_eq!(tracker.increment("bob"), None);
        assert_eq!(tracker.increment("alice"), None);
        assert_eq!(tracker.increment("carol"), Some(1));
        assert_eq!(tracker.increment("carol"), Some(2));
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_activating_peer_resets_count() {
        let mut tracker = UnreadTracker::load(Arc::new(MemoryStorage::new()), "alice");
        tracker.increment("carol");

        tracker.set_active(Some("carol"));
        assert_eq!(tracker.count("carol"), 0);
    }

    #[test]
    fn test_counts_survive_reload() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let mut tracker = UnreadTracker::load(storage.clone(), "alice");
            tracker.increment("carol");
            tracker.increment("dave");
        }

        let tracker = UnreadTracker::load(storage, "alice");
        assert_eq!(tracker.count("carol"), 1);
        assert_eq!(tracker.count("dave"), 1);
    }
}

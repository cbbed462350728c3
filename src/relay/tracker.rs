//! Insertion-ordered map from outbound (signing-service) request id to the originating
//! front-end connection, keyed by the id the request consumer assigned when it forwarded
//! the request upstream.
//!
//! The ordering is load-bearing for lost-message discard (see [`MessageTracker::pop_stale_before`]):
//! it must reflect insertion order, not the numeric value of the id, since ids wrap. An
//! `IndexMap` gives us O(1) lookup/remove plus stable iteration order, which a `BTreeMap`
//! (ordered by key) cannot.

use indexmap::IndexMap;

use crate::timestamp::UnixTimestamp;

/// One in-flight correspondence: a request forwarded to the Signing Service, and where
/// the eventual response should be routed back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTrackerItem {
    pub connection_id: u64,
    pub originating_request_id: u64,
    pub payload: Vec<u8>,
    pub enqueued_at: UnixTimestamp,
}

/// Owned solely by the request consumer (the single writer); the response producer only
/// reads and removes entries. Because both run as tasks on the same event loop with
/// explicit await points between operations, no additional lock is required — see §5.
#[derive(Debug, Default)]
pub struct MessageTracker {
    entries: IndexMap<u64, MessageTrackerItem>,
}

impl MessageTracker {
    pub fn new() -> Self {
        MessageTracker {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, signing_service_request_id: u64, item: MessageTrackerItem) {
        self.entries.insert(signing_service_request_id, item);
    }

    pub fn remove(&mut self, signing_service_request_id: u64) -> Option<MessageTrackerItem> {
        self.entries.shift_remove(signing_service_request_id)
    }

    pub fn get(&self, signing_service_request_id: u64) -> Option<&MessageTrackerItem> {
        self.entries.get(signing_service_request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pops every entry inserted strictly before `signing_service_request_id`, oldest
    /// first, leaving that id (if present) and anything inserted after it untouched.
    ///
    /// The Signing Service answers in whatever order suits it; when a response for id
    /// `R` arrives, every entry the request consumer inserted before `R` has necessarily
    /// been abandoned (the Signing Service will never answer them now), so the response
    /// producer discards them here before processing `R`.
    pub fn pop_stale_before(
        &mut self,
        signing_service_request_id: u64,
    ) -> Vec<(u64, MessageTrackerItem)> {
        let target_index = match self.entries.get_index_of(&signing_service_request_id) {
            Some(index) => index,
            None => return Vec::new(),
        };
        let mut stale = Vec::with_capacity(target_index);
        for _ in 0..target_index {
            if let Some((id, item)) = self.entries.shift_remove_index(0) {
                stale.push((id, item));
            }
        }
        stale
    }

    /// Drains every entry, oldest first — used when the upstream connection closes and
    /// every in-flight request must be failed back to its originator.
    pub fn drain_all(&mut self) -> Vec<(u64, MessageTrackerItem)> {
        self.entries.drain(..).collect()
    }

    pub fn all_connection_ids_in_order(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.values().map(|item| item.connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(connection_id: u64) -> MessageTrackerItem {
        MessageTrackerItem {
            connection_id,
            originating_request_id: connection_id,
            payload: vec![],
            enqueued_at: UnixTimestamp(0),
        }
    }

    #[test]
    fn pop_stale_before_discards_only_older_entries_in_insertion_order() {
        let mut tracker = MessageTracker::new();
        tracker.insert(7, item(1));
        tracker.insert(8, item(2));
        tracker.insert(9, item(3));

        // Upstream answers id 8 first; 7 was inserted earlier and is now stale.
        let stale = tracker.pop_stale_before(8);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, 7);

        assert!(tracker.get(7).is_none());
        assert!(tracker.get(8).is_some());
        assert!(tracker.get(9).is_some());
    }

    #[test]
    fn pop_stale_before_unknown_id_is_a_noop() {
        let mut tracker = MessageTracker::new();
        tracker.insert(1, item(1));
        let stale = tracker.pop_stale_before(999);
        assert!(stale.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn remove_then_pop_stale_leaves_no_entry_older_than_the_matched_id() {
        let mut tracker = MessageTracker::new();
        tracker.insert(1, item(10));
        tracker.insert(2, item(20));
        tracker.insert(3, item(30));

        let _ = tracker.pop_stale_before(3);
        tracker.remove(3);

        assert!(tracker.is_empty());
    }

    #[test]
    fn drain_all_returns_insertion_order() {
        let mut tracker = MessageTracker::new();
        tracker.insert(1, item(1));
        tracker.insert(2, item(2));
        let drained = tracker.drain_all();
        assert_eq!(drained.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);
    }
}

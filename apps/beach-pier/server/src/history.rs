use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use beach_pier_core::{HistoryRecord, Identity, PairKey};

/// Conversation logs keyed by the unordered pair of participants.
///
/// Logs only grow; nothing here evicts old records.
#[derive(Clone, Default)]
pub struct HistoryStore {
    logs: Arc<Mutex<HashMap<PairKey, Vec<HistoryRecord>>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, a: Identity, b: Identity, record: HistoryRecord) {
        self.logs
            .lock()
            .entry(PairKey::new(a, b))
            .or_default()
            .push(record);
    }

    /// Copy of the log shared by `a` and `b`, oldest first.
    pub fn get(&self, a: Identity, b: Identity) -> Vec<HistoryRecord> {
        self.logs
            .lock()
            .get(&PairKey::new(a, b))
            .cloned()
            .unwrap_or_default()
    }

    pub fn conversation_count(&self) -> usize {
        self.logs.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn unknown_pair_is_empty() {
        let store = HistoryStore::new();
        assert!(store
            .get(Identity::generate(), Identity::generate())
            .is_empty());
    }

    #[test_timeout::timeout]
    fn both_directions_share_one_log() {
        let store = HistoryStore::new();
        let alice = Identity::generate();
        let bob = Identity::generate();

        store.append(alice, bob, HistoryRecord::now("Alice", "hi"));
        store.append(bob, alice, HistoryRecord::now("Bob", "hey"));

        let forward = store.get(alice, bob);
        let backward = store.get(bob, alice);
        assert_eq!(forward, backward);
        let texts: Vec<&str> = forward.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["hi", "hey"]);
        assert_eq!(store.conversation_count(), 1);
    }

    #[test_timeout::timeout]
    fn separate_pairs_stay_separate() {
        let store = HistoryStore::new();
        let a = Identity::generate();
        let b = Identity::generate();
        let c = Identity::generate();

        store.append(a, b, HistoryRecord::now("a", "to b"));
        store.append(a, c, HistoryRecord::now("a", "to c"));

        assert_eq!(store.get(b, a).len(), 1);
        assert_eq!(store.get(c, a)[0].text, "to c");
        assert_eq!(store.conversation_count(), 2);
    }

    #[test_timeout::timeout]
    fn returned_log_is_a_copy() {
        let store = HistoryStore::new();
        let a = Identity::generate();
        let b = Identity::generate();
        store.append(a, b, HistoryRecord::now("a", "first"));

        let snapshot = store.get(a, b);
        store.append(a, b, HistoryRecord::now("a", "second"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.get(a, b).len(), 2);
    }
}

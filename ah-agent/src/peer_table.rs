//! Peer Table (§3 "Peer Entry", §4.4).
//!
//! An in-memory directory of known peers keyed by name prefix, with a
//! secondary lookup by stable id. Ids are never reused; a free-list of
//! vacated storage slots is kept instead, mirroring the source material's
//! own resolution of its "erase then push_back" invariant violation (§9).

use ah_common::name::Name;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// A known peer (§3 "Peer Entry").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub id: u64,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub prefix: Name,
    pub face_id: u64,
    pub live: bool,
}

#[derive(Debug, Default)]
struct Slot {
    entry: Option<PeerEntry>,
}

/// The peer directory. Not `Send`-shared directly; owned by the Discovery
/// Engine and reached by other components through `Arc<tokio::sync::Mutex<
/// PeerTable>>` (§5).
#[derive(Debug, Default)]
pub struct PeerTable {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    by_prefix: HashMap<Name, usize>,
    next_id: u64,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry for `prefix` if none exists, or returns the
    /// existing one. Returns `(entry, is_new)`.
    pub fn insert_or_get(&mut self, prefix: Name, ip: Ipv4Addr, port: u16) -> (PeerEntry, bool) {
        if let Some(&slot_idx) = self.by_prefix.get(&prefix) {
            let entry = self.slots[slot_idx].entry.clone().expect("by_prefix index is stale");
            return (entry, false);
        }

        let id = self.next_id;
        self.next_id += 1;

        let entry = PeerEntry { id, ip, port, prefix: prefix.clone(), face_id: 0, live: false };

        let slot_idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx].entry = Some(entry.clone());
            idx
        } else {
            self.slots.push(Slot { entry: Some(entry.clone()) });
            self.slots.len() - 1
        };

        self.by_prefix.insert(prefix, slot_idx);
        (entry, true)
    }

    /// Assigns the forwarder face id to the entry at `prefix` and marks it
    /// live.
    pub fn mark_face(&mut self, prefix: &Name, face_id: u64) {
        if let Some(&slot_idx) = self.by_prefix.get(prefix) {
            if let Some(entry) = self.slots[slot_idx].entry.as_mut() {
                entry.face_id = face_id;
                entry.live = true;
            }
        }
    }

    pub fn lookup_by_prefix(&self, prefix: &Name) -> Option<PeerEntry> {
        self.by_prefix.get(prefix).and_then(|&idx| self.slots[idx].entry.clone())
    }

    pub fn lookup_by_id(&self, id: u64) -> Option<PeerEntry> {
        self.slots.iter().find_map(|s| s.entry.as_ref().filter(|e| e.id == id).cloned())
    }

    pub fn remove_by_prefix(&mut self, prefix: &Name) -> Option<PeerEntry> {
        let slot_idx = self.by_prefix.remove(prefix)?;
        let entry = self.slots[slot_idx].entry.take();
        self.free_list.push(slot_idx);
        entry
    }

    pub fn remove_by_id(&mut self, id: u64) -> Option<PeerEntry> {
        let slot_idx = self
            .slots
            .iter()
            .position(|s| s.entry.as_ref().is_some_and(|e| e.id == id))?;
        let entry = self.slots[slot_idx].entry.take()?;
        self.by_prefix.remove(&entry.prefix);
        self.free_list.push(slot_idx);
        Some(entry)
    }

    /// Visits every live entry, ordered by id. Skips entries whose prefix
    /// has been cleared (vacated slots). Used where "live" (face created,
    /// route registered) is the correct predicate: the shutdown drain and
    /// the keepalive probe sweep.
    pub fn visit_live<F: FnMut(&PeerEntry)>(&self, mut f: F) {
        let mut live: Vec<&PeerEntry> = self
            .slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| e.live && !e.prefix.is_empty())
            .collect();
        live.sort_by_key(|e| e.id);
        for entry in live {
            f(entry);
        }
    }

    /// Visits every entry with a non-empty prefix, ordered by id, live or
    /// not. `piers` enumerates exactly this set: a peer inserted but still
    /// mid-bootstrap (face not yet created) is still a known peer.
    pub fn visit_all<F: FnMut(&PeerEntry)>(&self, mut f: F) {
        let mut all: Vec<&PeerEntry> = self
            .slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| !e.prefix.is_empty())
            .collect();
        all.sort_by_key(|e| e.id);
        for entry in all {
            f(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 1)
    }

    #[test]
    fn insert_or_get_is_idempotent_for_same_prefix() {
        let mut table = PeerTable::new();
        let prefix = Name::from_string("/node-a");
        let (first, is_new) = table.insert_or_get(prefix.clone(), ip(), 6363);
        assert!(is_new);
        let (second, is_new_again) = table.insert_or_get(prefix, ip(), 6363);
        assert!(!is_new_again);
        assert_eq!(first.id, second.id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ids_are_never_reused_after_removal() {
        let mut table = PeerTable::new();
        let (a, _) = table.insert_or_get(Name::from_string("/a"), ip(), 1);
        table.remove_by_prefix(&Name::from_string("/a"));
        let (b, _) = table.insert_or_get(Name::from_string("/b"), ip(), 2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn mark_face_sets_live_and_face_id() {
        let mut table = PeerTable::new();
        let prefix = Name::from_string("/a");
        table.insert_or_get(prefix.clone(), ip(), 1);
        table.mark_face(&prefix, 42);
        let entry = table.lookup_by_prefix(&prefix).unwrap();
        assert!(entry.live);
        assert_eq!(entry.face_id, 42);
    }

    #[test]
    fn visit_live_skips_non_live_entries_ordered_by_id() {
        let mut table = PeerTable::new();
        table.insert_or_get(Name::from_string("/a"), ip(), 1);
        let (b, _) = table.insert_or_get(Name::from_string("/b"), ip(), 2);
        table.mark_face(&Name::from_string("/b"), 5);

        let mut seen = Vec::new();
        table.visit_live(|e| seen.push(e.id));
        assert_eq!(seen, vec![b.id]);
    }

    #[test]
    fn visit_all_includes_not_yet_live_entries() {
        let mut table = PeerTable::new();
        let (a, _) = table.insert_or_get(Name::from_string("/a"), ip(), 1);
        let (b, _) = table.insert_or_get(Name::from_string("/b"), ip(), 2);
        table.mark_face(&Name::from_string("/b"), 5);

        let mut seen = Vec::new();
        table.visit_all(|e| seen.push(e.id));
        assert_eq!(seen, vec![a.id, b.id]);
    }

    #[test]
    fn remove_by_id_clears_both_indices() {
        let mut table = PeerTable::new();
        let (entry, _) = table.insert_or_get(Name::from_string("/a"), ip(), 1);
        table.remove_by_id(entry.id);
        assert!(table.lookup_by_prefix(&Name::from_string("/a")).is_none());
        assert!(table.is_empty());
    }
}

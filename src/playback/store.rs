use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::slot::SlotPos;
use super::state::PlaybackRecord;
use crate::audio::FrequencyTimeline;

/// Everything one slot publishes: its record and the timeline that goes with it.
#[derive(Clone, Debug)]
pub struct SlotEntry {
    pub record: PlaybackRecord,
    pub timeline: Arc<FrequencyTimeline>,
}

impl SlotEntry {
    /// A just-inserted song whose analysis hasn't finished.
    pub fn loading(record: PlaybackRecord) -> Self {
        Self {
            record,
            timeline: Arc::new(FrequencyTimeline::loading()),
        }
    }

    pub fn with_record(&self, record: PlaybackRecord) -> Self {
        Self {
            record,
            timeline: Arc::clone(&self.timeline),
        }
    }
}

/// Slot position -> current entry, one store per side of the process boundary.
///
/// Entries are swapped whole behind an `Arc`, so a reader holding one never
/// observes a mix of old and new fields. Updates run under the write lock,
/// which makes each read-modify-write atomic per slot.
#[derive(Debug, Default)]
pub struct SlotStore {
    slots: RwLock<HashMap<SlotPos, Arc<SlotEntry>>>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: SlotPos) -> Option<Arc<SlotEntry>> {
        self.slots.read().get(&slot).cloned()
    }

    /// Replaces whatever the slot held.
    pub fn put(&self, slot: SlotPos, entry: SlotEntry) -> Arc<SlotEntry> {
        let entry = Arc::new(entry);
        self.slots.write().insert(slot, Arc::clone(&entry));
        entry
    }

    /// Swaps in `f`'s result when it returns `Some`. Missing slots are left alone.
    pub fn update<F>(&self, slot: SlotPos, f: F) -> Option<Arc<SlotEntry>>
    where
        F: FnOnce(&SlotEntry) -> Option<SlotEntry>,
    {
        let mut slots = self.slots.write();
        let current = slots.get(&slot)?;
        let next = Arc::new(f(current)?);
        slots.insert(slot, Arc::clone(&next));
        Some(next)
    }

    /// Like [`update`](Self::update) but `f` sees empty slots too and may refuse with an error.
    pub fn try_update<F, E>(&self, slot: SlotPos, f: F) -> Result<Arc<SlotEntry>, E>
    where
        F: FnOnce(Option<&SlotEntry>) -> Result<SlotEntry, E>,
    {
        let mut slots = self.slots.write();
        let next = Arc::new(f(slots.get(&slot).map(Arc::as_ref))?);
        slots.insert(slot, Arc::clone(&next));
        Ok(next)
    }

    /// Replaces the slot with `f`'s result, computed from whatever it held, in one step.
    pub fn upsert<F>(&self, slot: SlotPos, f: F) -> Arc<SlotEntry>
    where
        F: FnOnce(Option<&SlotEntry>) -> SlotEntry,
    {
        let mut slots = self.slots.write();
        let next = Arc::new(f(slots.get(&slot).map(Arc::as_ref)));
        slots.insert(slot, Arc::clone(&next));
        next
    }

    /// Removes the slot only when `matches` accepts its current entry.
    pub fn remove_where<F>(&self, slot: SlotPos, matches: F) -> Option<Arc<SlotEntry>>
    where
        F: FnOnce(&SlotEntry) -> bool,
    {
        let mut slots = self.slots.write();
        if !matches(slots.get(&slot)?) {
            return None;
        }
        slots.remove(&slot)
    }

    pub fn remove(&self, slot: SlotPos) -> Option<Arc<SlotEntry>> {
        self.slots.write().remove(&slot)
    }

    /// Occupied slots, sorted for stable iteration.
    pub fn slots(&self) -> Vec<SlotPos> {
        let mut slots: Vec<SlotPos> = self.slots.read().keys().copied().collect();
        slots.sort();
        slots
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SongRef;
    use crate::playback::identity::SongIdentity;
    use crate::playback::state::PlaybackState;

    const SLOT: SlotPos = SlotPos::new(1, 2, 3);

    fn entry(raw: u64) -> SlotEntry {
        SlotEntry::loading(PlaybackRecord::loading(
            SongIdentity::from_raw(raw),
            SongRef::new("song"),
            false,
        ))
    }

    #[test]
    fn readers_keep_their_snapshot_across_swaps() {
        let store = SlotStore::new();
        store.put(SLOT, entry(1));
        let before = store.get(SLOT).unwrap();

        store.update(SLOT, |e| Some(e.with_record(e.record.ready(10).unwrap())));

        assert_eq!(before.record.state(), PlaybackState::Loading);
        assert_eq!(store.get(SLOT).unwrap().record.state(), PlaybackState::Ready);
    }

    #[test]
    fn update_skips_missing_slots_and_declined_changes() {
        let store = SlotStore::new();
        assert!(store.update(SLOT, |e| Some(e.clone())).is_none());

        store.put(SLOT, entry(1));
        assert!(store.update(SLOT, |_| None).is_none());
        assert_eq!(store.get(SLOT).unwrap().record.identity(), SongIdentity::from_raw(1));
    }

    #[test]
    fn try_update_propagates_refusal() {
        let store = SlotStore::new();
        let result: Result<_, &str> = store.try_update(SLOT, |e| e.cloned().ok_or("empty"));
        assert_eq!(result.unwrap_err(), "empty");
        assert!(store.is_empty());

        let result: Result<_, &str> = store.try_update(SLOT, |_| Ok(entry(2)));
        assert!(result.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_sees_the_current_entry() {
        let store = SlotStore::new();
        let first = store.upsert(SLOT, |current| {
            assert!(current.is_none());
            entry(1)
        });
        assert_eq!(first.record.identity(), SongIdentity::from_raw(1));

        let second = store.upsert(SLOT, |current| {
            let current = current.unwrap();
            current.with_record(current.record.with_revision(9))
        });
        assert_eq!(second.record.identity(), SongIdentity::from_raw(1));
        assert_eq!(store.get(SLOT).unwrap().record.revision(), 9);
    }

    #[test]
    fn remove_where_checks_entry() {
        let store = SlotStore::new();
        store.put(SLOT, entry(5));
        assert!(store
            .remove_where(SLOT, |e| e.record.identity() == SongIdentity::from_raw(6))
            .is_none());
        assert!(store
            .remove_where(SLOT, |e| e.record.identity() == SongIdentity::from_raw(5))
            .is_some());
        assert!(store.get(SLOT).is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_entries() {
        let store = Arc::new(SlotStore::new());
        store.put(SLOT, entry(0));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for raw in 1..500u64 {
                    let e = entry(raw);
                    store.put(SLOT, e.with_record(e.record.with_revision(raw)));
                }
            })
        };

        for _ in 0..500 {
            let snapshot = store.get(SLOT).unwrap();
            assert_eq!(snapshot.record.identity().raw(), snapshot.record.revision());
        }
        writer.join().unwrap();
    }
}

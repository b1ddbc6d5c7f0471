use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::executor::Executor;
use super::message::SlotUpdate;
use super::slot::SlotPos;
use super::state::{PlaybackRecord, PlaybackState};
use super::store::{SlotEntry, SlotStore};
use super::tracker::{slot_intensity, slot_state, AnalysisHub, AnalysisOutcome};
use super::Tick;
use crate::audio::{AudioSource, Channel, FrequencyTimeline};
use crate::config::Config;

/// Mirror of the server's slots.
///
/// State comes only from [`SlotUpdate`]s; the timeline does not. Each mirror
/// analyses songs on its own, so a slot can be `Ready` here while its
/// timeline is still loading.
pub struct ClientTracker {
    hub: AnalysisHub,
    applied: Mutex<HashMap<SlotPos, u64>>,
}

impl ClientTracker {
    pub fn new(
        store: Arc<SlotStore>,
        executor: Arc<dyn Executor>,
        source: Arc<dyn AudioSource>,
        config: &Config,
    ) -> Self {
        Self {
            hub: AnalysisHub::new("client", store, executor, source, config.analysis.clone(), false),
            applied: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SlotStore> {
        self.hub.store()
    }

    /// Applies a server update. Returns false when it was a duplicate or arrived out of order.
    pub fn apply(&self, update: &SlotUpdate) -> bool {
        let mut applied = self.applied.lock();
        let last = applied.entry(update.slot).or_insert(0);
        if update.revision <= *last {
            log::trace!(
                "[client] slot {}: ignoring revision {} (have {})",
                update.slot,
                update.revision,
                last
            );
            return false;
        }
        *last = update.revision;

        match &update.record {
            Some(record) => self.adopt(update.slot, record),
            None => {
                if self.store().remove(update.slot).is_some() {
                    log::debug!("[client] slot {}: cleared", update.slot);
                }
            }
        }
        true
    }

    /// Installs locally finished analyses. Returns the slots whose timeline changed.
    pub fn tick(&self) -> Vec<SlotPos> {
        installed_slots(self.hub.drain(|record| record))
    }

    /// Like [`tick`](Self::tick) but first blocks up to `timeout` for an analysis event.
    pub fn wait(&self, timeout: Duration) -> Vec<SlotPos> {
        installed_slots(self.hub.wait(timeout, |record| record))
    }

    pub fn state(&self, slot: SlotPos) -> PlaybackState {
        slot_state(self.store(), slot)
    }

    pub fn record(&self, slot: SlotPos) -> Option<PlaybackRecord> {
        self.store().get(slot).map(|entry| entry.record.clone())
    }

    pub fn timeline(&self, slot: SlotPos) -> Option<Arc<FrequencyTimeline>> {
        self.store().get(slot).map(|entry| Arc::clone(&entry.timeline))
    }

    /// Intensity of `channel` at absolute tick `now`; 0 unless the slot is playing.
    pub fn intensity(&self, slot: SlotPos, channel: Channel, now: Tick) -> f32 {
        slot_intensity(self.store(), slot, channel, now)
    }

    fn adopt(&self, slot: SlotPos, record: &PlaybackRecord) {
        let mut fresh = false;
        self.store().upsert(slot, |current| match current {
            Some(entry) if entry.record.identity() == record.identity() => {
                entry.with_record(record.with_local_progress(entry.record.progress()))
            }
            _ => {
                fresh = true;
                SlotEntry::loading(record.with_local_progress(0.0))
            }
        });

        if fresh {
            log::debug!("[client] slot {slot}: new song {} ({})", record.song(), record.identity());
            self.hub.spawn(slot, record.identity(), record.song().clone());
        }
    }
}

fn installed_slots(outcomes: Vec<AnalysisOutcome>) -> Vec<SlotPos> {
    outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            AnalysisOutcome::Installed { slot, .. } => Some(slot),
            AnalysisOutcome::Failed { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MemorySource, SampleBuffer, SongRef};
    use crate::playback::executor::ManualExecutor;
    use crate::playback::server::ServerTracker;

    const SLOT: SlotPos = SlotPos::new(-2, 11, 40);

    fn source() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .with(SongRef::new("a"), SampleBuffer::new(vec![0.0; 8_000], 8_000))
                .with(SongRef::new("b"), SampleBuffer::new(vec![0.0; 16_000], 8_000)),
        )
    }

    struct Pair {
        server: ServerTracker,
        server_jobs: Arc<ManualExecutor>,
        client: ClientTracker,
        client_jobs: Arc<ManualExecutor>,
    }

    fn pair() -> Pair {
        let server_jobs = Arc::new(ManualExecutor::new());
        let client_jobs = Arc::new(ManualExecutor::new());
        let config = Config::default();
        Pair {
            server: ServerTracker::new(Arc::new(SlotStore::new()), server_jobs.clone(), source(), &config),
            server_jobs,
            client: ClientTracker::new(Arc::new(SlotStore::new()), client_jobs.clone(), source(), &config),
            client_jobs,
        }
    }

    #[test]
    fn mirror_follows_server_state_but_loads_its_own_timeline() {
        let p = pair();
        assert!(p.client.apply(&p.server.insert(SLOT, SongRef::new("a"), 1000)));
        assert_eq!(p.client.state(SLOT), PlaybackState::Loading);
        assert_eq!(p.client_jobs.pending(), 1);

        p.server_jobs.run_all();
        for update in p.server.tick(1001) {
            assert!(p.client.apply(&update));
        }
        assert_eq!(p.client.state(SLOT), PlaybackState::Ready);
        assert!(p.client.timeline(SLOT).unwrap().is_loading());
        assert_eq!(p.client.record(SLOT).unwrap().progress(), 0.0);

        p.client_jobs.run_all();
        assert_eq!(p.client.tick(), vec![SLOT]);
        assert_eq!(p.client.state(SLOT), PlaybackState::Ready);
        assert_eq!(p.client.timeline(SLOT).unwrap().len(), 20);
        assert_eq!(p.client.record(SLOT).unwrap().progress(), 1.0);
        assert_eq!(
            p.client.timeline(SLOT).unwrap().as_ref(),
            p.server.timeline(SLOT).unwrap().as_ref()
        );
    }

    #[test]
    fn local_timeline_survives_later_updates_for_the_same_song() {
        let p = pair();
        p.client.apply(&p.server.insert(SLOT, SongRef::new("a"), 0));
        p.client_jobs.run_all();
        p.client.tick();
        let local = p.client.timeline(SLOT).unwrap();
        assert_eq!(p.client_jobs.pending(), 0);

        p.server_jobs.run_all();
        for update in p.server.tick(1) {
            p.client.apply(&update);
        }
        p.client.apply(&p.server.play(SLOT, 5).unwrap());

        assert_eq!(p.client.state(SLOT), PlaybackState::Playing);
        assert!(Arc::ptr_eq(&local, &p.client.timeline(SLOT).unwrap()));
        assert_eq!(p.client.record(SLOT).unwrap().start_tick(), 5);
        assert_eq!(p.client_jobs.pending(), 0);
    }

    #[test]
    fn install_racing_with_updates_keeps_the_timeline() {
        for _ in 0..20 {
            let p = pair();
            let inserted = p.server.insert(SLOT, SongRef::new("a"), 0);
            let record = inserted.record.clone().unwrap();
            p.client.apply(&inserted);

            std::thread::scope(|s| {
                s.spawn(|| {
                    for revision in 2..500 {
                        p.client.apply(&SlotUpdate::set(SLOT, record.with_revision(revision)));
                    }
                });
                p.client_jobs.run_all();
                assert_eq!(p.client.tick(), vec![SLOT]);
            });

            assert!(!p.client.timeline(SLOT).unwrap().is_loading());
            assert_eq!(p.client.record(SLOT).unwrap().progress(), 1.0);
            assert_eq!(p.client_jobs.pending(), 0);
        }
    }

    #[test]
    fn duplicate_and_reordered_updates_are_ignored() {
        let p = pair();
        let inserted = p.server.insert(SLOT, SongRef::new("a"), 0);
        p.server_jobs.run_all();
        let ready = p.server.tick(1).remove(0);
        let playing = p.server.play(SLOT, 2).unwrap();

        assert!(p.client.apply(&inserted));
        assert!(p.client.apply(&playing));
        assert!(!p.client.apply(&ready));
        assert!(!p.client.apply(&playing));
        assert_eq!(p.client.state(SLOT), PlaybackState::Playing);
        assert_eq!(p.client_jobs.pending(), 1);
    }

    #[test]
    fn removal_clears_the_mirror() {
        let p = pair();
        p.client.apply(&p.server.insert(SLOT, SongRef::new("a"), 0));
        p.client.apply(&p.server.remove(SLOT).unwrap());
        assert_eq!(p.client.state(SLOT), PlaybackState::Empty);

        p.client_jobs.run_all();
        assert!(p.client.tick().is_empty());
        assert_eq!(p.client.state(SLOT), PlaybackState::Empty);
    }

    #[test]
    fn superseded_local_analysis_is_discarded() {
        let p = pair();
        p.client.apply(&p.server.insert(SLOT, SongRef::new("a"), 10));
        p.client.apply(&p.server.insert(SLOT, SongRef::new("b"), 11));
        assert_eq!(p.client_jobs.pending(), 2);

        assert!(p.client_jobs.run_oldest());
        assert!(p.client.tick().is_empty());
        assert!(p.client.timeline(SLOT).unwrap().is_loading());

        assert!(p.client_jobs.run_oldest());
        assert_eq!(p.client.tick(), vec![SLOT]);
        assert_eq!(p.client.timeline(SLOT).unwrap().len(), 40);
        assert_eq!(p.client.record(SLOT).unwrap().song(), &SongRef::new("b"));
    }

    #[test]
    fn mirror_intensity_matches_server() {
        let p = pair();
        p.client.apply(&p.server.insert(SLOT, SongRef::new("a"), 0));
        p.server_jobs.run_all();
        p.client_jobs.run_all();
        p.client.tick();
        for update in p.server.tick(1) {
            p.client.apply(&update);
        }
        p.client.apply(&p.server.play(SLOT, 100).unwrap());

        for now in 90..130 {
            assert_eq!(
                p.client.intensity(SLOT, Channel::All, now),
                p.server.intensity(SLOT, Channel::All, now)
            );
        }
    }
}

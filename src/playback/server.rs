use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::executor::Executor;
use super::identity::SongIdentity;
use super::message::SlotUpdate;
use super::slot::SlotPos;
use super::state::{Command, PlaybackRecord, PlaybackState};
use super::store::{SlotEntry, SlotStore};
use super::tracker::{slot_intensity, slot_state, AnalysisHub, AnalysisOutcome};
use super::Tick;
use crate::audio::{AudioSource, Channel, FrequencyTimeline, SongRef};
use crate::config::Config;
use crate::error::TransitionError;

/// Authoritative playback tracker.
///
/// Every accepted command returns the [`SlotUpdate`] that mirrors need to
/// see; delivering it is the caller's job.
pub struct ServerTracker {
    hub: AnalysisHub,
    sequence: AtomicU64,
}

impl ServerTracker {
    pub fn new(
        store: Arc<SlotStore>,
        executor: Arc<dyn Executor>,
        source: Arc<dyn AudioSource>,
        config: &Config,
    ) -> Self {
        Self {
            hub: AnalysisHub::new(
                "server",
                store,
                executor,
                source,
                config.analysis.clone(),
                config.playback.drop_failed_songs,
            ),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<SlotStore> {
        self.hub.store()
    }

    /// Loads `song` into `slot`, superseding whatever was there, and starts analysing it.
    pub fn insert(&self, slot: SlotPos, song: SongRef, now: Tick) -> SlotUpdate {
        let sequence = self.next_sequence();
        let identity = SongIdentity::mint(now, slot, sequence);
        let record = PlaybackRecord::loading(identity, song.clone(), false).with_revision(sequence);

        self.store().put(slot, SlotEntry::loading(record.clone()));
        log::info!("[server] slot {slot}: inserted {song} as {identity}");

        self.hub.spawn(slot, identity, song);
        SlotUpdate::set(slot, record)
    }

    pub fn play(&self, slot: SlotPos, now: Tick) -> Result<SlotUpdate, TransitionError> {
        self.transition(slot, Command::Play, |record| record.play(now))
    }

    pub fn pause(&self, slot: SlotPos, now: Tick) -> Result<SlotUpdate, TransitionError> {
        self.transition(slot, Command::Pause, |record| record.pause(now))
    }

    pub fn stop(&self, slot: SlotPos) -> Result<SlotUpdate, TransitionError> {
        self.transition(slot, Command::Stop, PlaybackRecord::stop)
    }

    pub fn set_looping(&self, slot: SlotPos, looping: bool) -> Result<SlotUpdate, TransitionError> {
        self.transition(slot, Command::SetLooping, |record| Ok(record.with_looping(looping)))
    }

    /// Clears the slot. In-flight analysis for it will be discarded on arrival.
    pub fn remove(&self, slot: SlotPos) -> Result<SlotUpdate, TransitionError> {
        let removed = self.store().remove(slot).ok_or(TransitionError::Illegal {
            command: Command::Remove,
            state: PlaybackState::Empty,
        })?;
        log::info!("[server] slot {slot}: removed {}", removed.record.song());
        Ok(SlotUpdate::removed(slot, self.next_sequence()))
    }

    /// Publishes finished analyses and stops songs that have run out.
    pub fn tick(&self, now: Tick) -> Vec<SlotUpdate> {
        let outcomes = self.hub.drain(|record| record.with_revision(self.next_sequence()));
        let mut updates = self.outcome_updates(outcomes);
        updates.extend(self.finish_songs(now));
        updates
    }

    /// Like [`tick`](Self::tick) but first blocks up to `timeout` for an analysis event.
    pub fn wait(&self, now: Tick, timeout: Duration) -> Vec<SlotUpdate> {
        let outcomes = self
            .hub
            .wait(timeout, |record| record.with_revision(self.next_sequence()));
        let mut updates = self.outcome_updates(outcomes);
        updates.extend(self.finish_songs(now));
        updates
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

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn transition<F>(
        &self,
        slot: SlotPos,
        command: Command,
        f: F,
    ) -> Result<SlotUpdate, TransitionError>
    where
        F: FnOnce(&PlaybackRecord) -> Result<PlaybackRecord, TransitionError>,
    {
        let result = self.store().try_update(slot, |current| {
            let current = current.ok_or(TransitionError::Illegal {
                command,
                state: PlaybackState::Empty,
            })?;
            let record = f(&current.record)?;
            Ok(current.with_record(record.with_revision(self.next_sequence())))
        });

        match result {
            Ok(entry) => {
                log::debug!("[server] slot {slot}: {command} -> {}", entry.record.state());
                Ok(SlotUpdate::set(slot, entry.record.clone()))
            }
            Err(err) => {
                log::debug!("[server] slot {slot}: rejected: {err}");
                Err(err)
            }
        }
    }

    fn outcome_updates(&self, outcomes: Vec<AnalysisOutcome>) -> Vec<SlotUpdate> {
        outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                AnalysisOutcome::Installed { slot, entry } => {
                    Some(SlotUpdate::set(slot, entry.record.clone()))
                }
                AnalysisOutcome::Failed {
                    slot,
                    dropped: true,
                    ..
                } => Some(SlotUpdate::removed(slot, self.next_sequence())),
                AnalysisOutcome::Failed { .. } => None,
            })
            .collect()
    }

    fn finish_songs(&self, now: Tick) -> Vec<SlotUpdate> {
        let mut updates = Vec::new();
        for slot in self.store().slots() {
            let finished = self.store().update(slot, |entry| {
                if !entry.record.finished(now) {
                    return None;
                }
                let record = entry.record.stop().ok()?;
                Some(entry.with_record(record.with_revision(self.next_sequence())))
            });
            if let Some(entry) = finished {
                log::info!("[server] slot {slot}: {} finished", entry.record.song());
                updates.push(SlotUpdate::set(slot, entry.record.clone()));
            }
        }
        updates
    }
}

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use super::executor::Executor;
use super::identity::SongIdentity;
use super::slot::SlotPos;
use super::state::{PlaybackRecord, PlaybackState};
use super::store::{SlotEntry, SlotStore};
use super::Tick;
use crate::audio::{analyze_song, AudioSource, Channel, FrequencyTimeline, SongRef};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Share of the progress bar spent fetching audio before analysis starts.
const SOURCE_PROGRESS: f32 = 0.3;

/// Message from a background analysis task back to the tick thread.
enum AnalysisEvent {
    Progress {
        slot: SlotPos,
        identity: SongIdentity,
        progress: f32,
    },
    Finished {
        slot: SlotPos,
        identity: SongIdentity,
        result: Result<FrequencyTimeline, AnalysisError>,
    },
}

/// What happened to a finished analysis once it reached the tick thread.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Installed {
        slot: SlotPos,
        entry: Arc<SlotEntry>,
    },
    Failed {
        slot: SlotPos,
        identity: SongIdentity,
        error: AnalysisError,
        /// The slot was cleared because of the failure.
        dropped: bool,
    },
}

/// Issues analysis tasks and installs their results, one per tracker side.
///
/// Tasks never touch the store. They send events over a channel and the
/// owning tracker drains it on the tick thread, checking each result's
/// identity against the slot's current song before publishing it.
pub(crate) struct AnalysisHub {
    side: &'static str,
    store: Arc<SlotStore>,
    executor: Arc<dyn Executor>,
    source: Arc<dyn AudioSource>,
    config: AnalysisConfig,
    drop_failed: bool,
    tx: Sender<AnalysisEvent>,
    rx: Receiver<AnalysisEvent>,
}

impl AnalysisHub {
    pub(crate) fn new(
        side: &'static str,
        store: Arc<SlotStore>,
        executor: Arc<dyn Executor>,
        source: Arc<dyn AudioSource>,
        config: AnalysisConfig,
        drop_failed: bool,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            side,
            store,
            executor,
            source,
            config,
            drop_failed,
            tx,
            rx,
        }
    }

    pub(crate) fn store(&self) -> &Arc<SlotStore> {
        &self.store
    }

    /// Queues analysis of `song` tagged with `identity`. Fire and forget.
    pub(crate) fn spawn(&self, slot: SlotPos, identity: SongIdentity, song: SongRef) {
        let tx = self.tx.clone();
        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let side = self.side;

        log::debug!("[{side}] analysing {song} for slot {slot} as {identity}");
        self.executor.execute(Box::new(move || {
            let report = |progress: f32| {
                let _ = tx.send(AnalysisEvent::Progress {
                    slot,
                    identity,
                    progress,
                });
            };
            let result = catch_unwind(AssertUnwindSafe(|| {
                run_analysis(source.as_ref(), &song, &config, report)
            }))
            .unwrap_or(Err(AnalysisError::WorkerPanicked));

            // The receiver only disappears with its tracker, at which point nobody cares.
            let _ = tx.send(AnalysisEvent::Finished {
                slot,
                identity,
                result,
            });
        }));
    }

    /// Handles every event that has already arrived.
    ///
    /// `revise` is applied to records as they are installed, letting the
    /// server stamp a fresh revision.
    pub(crate) fn drain(
        &self,
        mut revise: impl FnMut(PlaybackRecord) -> PlaybackRecord,
    ) -> Vec<AnalysisOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if let Some(outcome) = self.handle(event, &mut revise) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Blocks up to `timeout` for the next event, then drains the rest.
    pub(crate) fn wait(
        &self,
        timeout: Duration,
        mut revise: impl FnMut(PlaybackRecord) -> PlaybackRecord,
    ) -> Vec<AnalysisOutcome> {
        let mut outcomes = Vec::new();
        match self.rx.recv_timeout(timeout) {
            Ok(event) => outcomes.extend(self.handle(event, &mut revise)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return outcomes,
        }
        outcomes.extend(self.drain(revise));
        outcomes
    }

    fn handle(
        &self,
        event: AnalysisEvent,
        revise: &mut impl FnMut(PlaybackRecord) -> PlaybackRecord,
    ) -> Option<AnalysisOutcome> {
        match event {
            AnalysisEvent::Progress {
                slot,
                identity,
                progress,
            } => {
                self.store.update(slot, |entry| {
                    (entry.record.identity() == identity
                        && entry.record.state() == PlaybackState::Loading)
                        .then(|| entry.with_record(entry.record.with_progress(progress)))
                });
                None
            }
            AnalysisEvent::Finished {
                slot,
                identity,
                result: Ok(timeline),
            } => self.install(slot, identity, timeline, revise),
            AnalysisEvent::Finished {
                slot,
                identity,
                result: Err(error),
            } => Some(self.fail(slot, identity, error)),
        }
    }

    fn install(
        &self,
        slot: SlotPos,
        identity: SongIdentity,
        timeline: FrequencyTimeline,
        revise: &mut impl FnMut(PlaybackRecord) -> PlaybackRecord,
    ) -> Option<AnalysisOutcome> {
        let duration = timeline.len() as u64;
        let installed = self.store.update(slot, |entry| {
            if entry.record.identity() != identity {
                return None;
            }
            // A mirror may already have been moved past LOADING by the server.
            let record = match entry.record.ready(duration) {
                Ok(record) => revise(record),
                Err(_) => entry.record.with_local_progress(1.0),
            };
            Some(SlotEntry {
                record,
                timeline: Arc::new(timeline),
            })
        });

        match installed {
            Some(entry) => {
                log::info!(
                    "[{}] slot {} ready: {} ticks for {}",
                    self.side,
                    slot,
                    duration,
                    entry.record.song()
                );
                Some(AnalysisOutcome::Installed { slot, entry })
            }
            None => {
                log::trace!("[{}] discarding stale analysis {} for slot {}", self.side, identity, slot);
                None
            }
        }
    }

    fn fail(&self, slot: SlotPos, identity: SongIdentity, error: AnalysisError) -> AnalysisOutcome {
        let current = self
            .store
            .get(slot)
            .is_some_and(|entry| entry.record.identity() == identity);
        if !current {
            log::trace!("[{}] ignoring failure of stale analysis {}: {}", self.side, identity, error);
            return AnalysisOutcome::Failed {
                slot,
                identity,
                error,
                dropped: false,
            };
        }

        log::warn!("[{}] analysis for slot {} failed: {}", self.side, slot, error);
        let dropped = self.drop_failed
            && self
                .store
                .remove_where(slot, |entry| entry.record.identity() == identity)
                .is_some();
        AnalysisOutcome::Failed {
            slot,
            identity,
            error,
            dropped,
        }
    }
}

fn run_analysis(
    source: &dyn AudioSource,
    song: &SongRef,
    config: &AnalysisConfig,
    report: impl Fn(f32),
) -> Result<FrequencyTimeline, AnalysisError> {
    let audio = source.load(song)?;
    report(SOURCE_PROGRESS);
    analyze_song(&audio, config, |p| report(SOURCE_PROGRESS + (1.0 - SOURCE_PROGRESS) * p))
}

/// Current state of `slot`, `Empty` when nothing is loaded.
pub(crate) fn slot_state(store: &SlotStore, slot: SlotPos) -> PlaybackState {
    store
        .get(slot)
        .map_or(PlaybackState::Empty, |entry| entry.record.state())
}

/// Intensity a consumer at `slot` should show at absolute tick `now`. Silent unless playing.
pub(crate) fn slot_intensity(store: &SlotStore, slot: SlotPos, channel: Channel, now: Tick) -> f32 {
    store
        .get(slot)
        .and_then(|entry| {
            entry
                .record
                .playing_offset(now)
                .map(|offset| entry.timeline.intensity(channel, offset))
        })
        .unwrap_or(0.0)
}

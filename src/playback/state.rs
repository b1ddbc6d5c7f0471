//! Playback state machine for one slot.
//!
//! `PlaybackRecord` is an immutable value: every transition consumes a
//! reference and returns a whole new record, so a reader holding the old one
//! never sees a half-applied change. An empty slot has no record at all.
//!
//! ```text
//! EMPTY -> LOADING -> READY -> PLAYING <-> STOPPED
//!   ^_________________ remove ____________________|
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::SongIdentity;
use super::Tick;
use crate::audio::SongRef;
use crate::error::TransitionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Empty,
    Loading,
    Ready,
    Playing,
    /// Paused or stopped; `paused_tick` says where the next play resumes.
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaybackState::Empty => "empty",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopped => "stopped",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Insert,
    Play,
    Pause,
    Stop,
    Remove,
    SetLooping,
    /// Installing a finished analysis.
    Complete,
}

impl Command {
    /// Whether `self` may be issued while a slot is in `state`.
    pub fn allowed_in(self, state: PlaybackState) -> bool {
        use PlaybackState::*;
        match self {
            Command::Insert => true,
            Command::Play => matches!(state, Ready | Stopped),
            Command::Pause | Command::Stop => state == Playing,
            Command::Remove | Command::SetLooping => state != Empty,
            Command::Complete => state == Loading,
        }
    }

    /// `Ok(())` when allowed, otherwise the matching rejection.
    pub fn check(self, state: PlaybackState) -> Result<(), TransitionError> {
        if self.allowed_in(state) {
            Ok(())
        } else {
            Err(TransitionError::Illegal { command: self, state })
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Insert => "insert",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Remove => "remove",
            Command::SetLooping => "set looping",
            Command::Complete => "complete analysis",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRecord {
    state: PlaybackState,
    identity: SongIdentity,
    song: SongRef,
    progress: f32,
    start_tick: Tick,
    paused_tick: Option<Tick>,
    looping: bool,
    duration_ticks: Option<u64>,
    revision: u64,
}

impl PlaybackRecord {
    /// Fresh record for a song that has just been inserted.
    pub fn loading(identity: SongIdentity, song: SongRef, looping: bool) -> Self {
        Self {
            state: PlaybackState::Loading,
            identity,
            song,
            progress: 0.0,
            start_tick: 0,
            paused_tick: None,
            looping,
            duration_ticks: None,
            revision: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn identity(&self) -> SongIdentity {
        self.identity
    }

    pub fn song(&self) -> &SongRef {
        &self.song
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Absolute tick the song (virtually) started at while playing.
    pub fn start_tick(&self) -> Tick {
        self.start_tick
    }

    pub fn paused_tick(&self) -> Option<Tick> {
        self.paused_tick
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn duration_ticks(&self) -> Option<u64> {
        self.duration_ticks
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Progress only moves forward and stays within [0, 1].
    pub fn with_progress(&self, progress: f32) -> Self {
        let progress = if progress.is_nan() { self.progress } else { progress.clamp(0.0, 1.0) };
        Self {
            progress: self.progress.max(progress),
            ..self.clone()
        }
    }

    pub fn with_looping(&self, looping: bool) -> Self {
        Self {
            looping,
            ..self.clone()
        }
    }

    pub fn with_revision(&self, revision: u64) -> Self {
        Self {
            revision,
            ..self.clone()
        }
    }

    /// Replaces progress outright; mirrors track their own loading, not the server's.
    pub fn with_local_progress(&self, progress: f32) -> Self {
        Self {
            progress: if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) },
            ..self.clone()
        }
    }

    /// LOADING -> READY once a timeline of `duration_ticks` is installed.
    pub fn ready(&self, duration_ticks: u64) -> Result<Self, TransitionError> {
        Command::Complete.check(self.state)?;
        Ok(Self {
            state: PlaybackState::Ready,
            progress: 1.0,
            duration_ticks: Some(duration_ticks),
            ..self.clone()
        })
    }

    /// Starts or resumes. A paused offset back-dates the start tick so offsets continue seamlessly.
    pub fn play(&self, now: Tick) -> Result<Self, TransitionError> {
        Command::Play.check(self.state)?;
        Ok(Self {
            state: PlaybackState::Playing,
            start_tick: now - self.paused_tick.unwrap_or(0),
            paused_tick: None,
            ..self.clone()
        })
    }

    /// Captures the current offset so the next play resumes there.
    pub fn pause(&self, now: Tick) -> Result<Self, TransitionError> {
        Command::Pause.check(self.state)?;
        let offset = self.playing_offset(now).unwrap_or(0).max(0);
        Ok(Self {
            state: PlaybackState::Stopped,
            paused_tick: Some(offset),
            ..self.clone()
        })
    }

    /// Hard stop: the next play starts from the beginning.
    pub fn stop(&self) -> Result<Self, TransitionError> {
        Command::Stop.check(self.state)?;
        Ok(Self {
            state: PlaybackState::Stopped,
            paused_tick: Some(0),
            ..self.clone()
        })
    }

    /// Ticks since song start while playing, wrapped for looping songs.
    pub fn playing_offset(&self, now: Tick) -> Option<Tick> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        let offset = now - self.start_tick;
        match self.duration_ticks {
            Some(duration) if self.looping && duration > 0 => Some(offset.rem_euclid(duration as Tick)),
            _ => Some(offset),
        }
    }

    /// A non-looping song that has played past its end.
    pub fn finished(&self, now: Tick) -> bool {
        match (self.playing_offset(now), self.duration_ticks) {
            (Some(offset), Some(duration)) => !self.looping && offset >= duration as Tick,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackState::*;

    fn loading() -> PlaybackRecord {
        PlaybackRecord::loading(SongIdentity::from_raw(7), SongRef::new("song"), false)
    }

    fn ready() -> PlaybackRecord {
        loading().ready(200).unwrap()
    }

    #[test]
    fn command_table() {
        let all = [Empty, Loading, Ready, Playing, Stopped];
        for state in all {
            assert!(Command::Insert.allowed_in(state));
            assert_eq!(Command::Play.allowed_in(state), matches!(state, Ready | Stopped));
            assert_eq!(Command::Pause.allowed_in(state), state == Playing);
            assert_eq!(Command::Stop.allowed_in(state), state == Playing);
            assert_eq!(Command::Remove.allowed_in(state), state != Empty);
            assert_eq!(Command::Complete.allowed_in(state), state == Loading);
        }
    }

    #[test]
    fn illegal_commands_leave_the_record_alone() {
        let record = ready();
        assert_eq!(
            record.pause(10),
            Err(TransitionError::Illegal { command: Command::Pause, state: Ready })
        );
        assert!(record.stop().is_err());
        assert!(loading().play(10).is_err());
        assert_eq!(record.state(), Ready);

        let playing = record.play(10).unwrap();
        assert!(playing.play(11).is_err());
        assert!(playing.ready(5).is_err());
    }

    #[test]
    fn pause_and_resume_back_dates_start() {
        let playing = ready().play(1050).unwrap();
        assert_eq!(playing.start_tick(), 1050);
        assert_eq!(playing.playing_offset(1060), Some(10));

        let paused = playing.pause(1100).unwrap();
        assert_eq!(paused.state(), Stopped);
        assert_eq!(paused.paused_tick(), Some(50));
        assert_eq!(paused.playing_offset(1100), None);

        let resumed = paused.play(1200).unwrap();
        assert_eq!(resumed.start_tick(), 1150);
        assert_eq!(resumed.paused_tick(), None);
        assert_eq!(resumed.playing_offset(1200), Some(50));
    }

    #[test]
    fn stop_restarts_from_zero() {
        let stopped = ready().play(100).unwrap().stop().unwrap();
        assert_eq!(stopped.paused_tick(), Some(0));
        assert_eq!(stopped.play(500).unwrap().start_tick(), 500);
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let record = loading().with_progress(0.4);
        assert_eq!(record.progress(), 0.4);
        assert_eq!(record.with_progress(0.2).progress(), 0.4);
        assert_eq!(record.with_progress(3.0).progress(), 1.0);
        assert_eq!(record.with_progress(f32::NAN).progress(), 0.4);
        assert_eq!(loading().with_progress(-1.0).progress(), 0.0);
    }

    #[test]
    fn looping_wraps_offset_and_never_finishes() {
        let playing = ready().with_looping(true).play(0).unwrap();
        assert_eq!(playing.playing_offset(450), Some(50));
        assert!(!playing.finished(10_000));

        let once = ready().play(0).unwrap();
        assert!(!once.finished(199));
        assert!(once.finished(200));
    }
}

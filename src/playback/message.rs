use serde::{Deserialize, Serialize};

use super::slot::SlotPos;
use super::state::{PlaybackRecord, PlaybackState};

/// Full target state of one slot, sent from the authoritative tracker to mirrors.
///
/// Carries the whole record rather than a delta, so applying the same update
/// twice is harmless. `revision` increases with every update the server emits;
/// mirrors drop anything not newer than what they already applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub slot: SlotPos,
    pub revision: u64,
    /// `None` once the song has been removed.
    pub record: Option<PlaybackRecord>,
}

impl SlotUpdate {
    pub fn set(slot: SlotPos, record: PlaybackRecord) -> Self {
        Self {
            slot,
            revision: record.revision(),
            record: Some(record),
        }
    }

    pub fn removed(slot: SlotPos, revision: u64) -> Self {
        Self {
            slot,
            revision,
            record: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.record
            .as_ref()
            .map_or(PlaybackState::Empty, PlaybackRecord::state)
    }
}

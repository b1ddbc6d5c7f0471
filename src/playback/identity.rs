use serde::{Deserialize, Serialize};
use std::fmt;

use super::slot::{mix64, SlotPos};
use super::Tick;

/// Token minted when a song starts loading into a slot.
///
/// Only used to recognise stale analysis results. It is not a security token:
/// a collision makes a stale result look fresh, nothing more.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongIdentity(u64);

impl SongIdentity {
    /// Derives an identity from the insertion tick, the slot's salt and a
    /// per-tracker sequence number that separates inserts within one tick.
    pub fn mint(start_tick: Tick, slot: SlotPos, sequence: u64) -> Self {
        let seed = (start_tick as u64)
            .wrapping_mul(0x0000_0100_0000_01B3)
            ^ slot.salt()
            ^ sequence.rotate_left(32);
        SongIdentity(mix64(seed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        SongIdentity(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SongIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

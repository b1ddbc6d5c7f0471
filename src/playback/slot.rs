use serde::{Deserialize, Serialize};
use std::fmt;

/// Block position of a jukebox-like fixture. Each position holds at most one song.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SlotPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Stable per-position salt used when minting song identities.
    pub fn salt(&self) -> u64 {
        let packed = ((self.x as u32 as u64) << 38)
            ^ ((self.z as u32 as u64) << 12)
            ^ (self.y as u32 as u64);
        mix64(packed)
    }
}

impl fmt::Display for SlotPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// SplitMix64 finaliser.
pub(crate) fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbouring_positions_get_distinct_salts() {
        let origin = SlotPos::new(0, 64, 0);
        let salts = [
            origin.salt(),
            SlotPos::new(1, 64, 0).salt(),
            SlotPos::new(0, 65, 0).salt(),
            SlotPos::new(0, 64, 1).salt(),
            SlotPos::new(-1, 64, 0).salt(),
        ];
        for (i, a) in salts.iter().enumerate() {
            for b in &salts[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(origin.salt(), SlotPos::new(0, 64, 0).salt());
    }
}

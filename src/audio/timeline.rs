use serde::Serialize;

use super::features::{Band, Channel, SpectralFrame, BAND_COUNT};
use super::onset::detect_onsets;
use super::spectrum::{HOP_SIZE, SILENCE_DB};
use crate::config::AnalysisConfig;

/// Per-tick, per-band lighting intensities for one song.
///
/// Immutable once built. Reads outside `[0, len)` are silence, and the loading
/// placeholder is simply a timeline with no ticks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrequencyTimeline {
    tick_rate: u32,
    loading: bool,
    ticks: Vec<[f32; BAND_COUNT]>,
}

impl FrequencyTimeline {
    /// Zero-length placeholder shown while analysis is in flight.
    pub fn loading() -> Self {
        Self {
            tick_rate: 0,
            loading: true,
            ticks: Vec::new(),
        }
    }

    pub fn from_ticks(tick_rate: u32, ticks: Vec<[f32; BAND_COUNT]>) -> Self {
        Self {
            tick_rate,
            loading: false,
            ticks,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Length in ticks.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Intensity of `channel` at `tick` ticks from song start, 0 outside the song.
    pub fn intensity(&self, channel: Channel, tick: i64) -> f32 {
        let Some(values) = self.tick_values(tick) else {
            return 0.0;
        };
        match channel {
            Channel::Band(band) => values[band.index()],
            Channel::All => values.iter().sum::<f32>() / BAND_COUNT as f32,
        }
    }

    /// Discrete on/off lighting signal.
    pub fn is_lit(&self, channel: Channel, tick: i64, threshold: f32) -> bool {
        let value = self.intensity(channel, tick);
        value > 0.0 && value >= threshold
    }

    fn tick_values(&self, tick: i64) -> Option<&[f32; BAND_COUNT]> {
        usize::try_from(tick).ok().and_then(|t| self.ticks.get(t))
    }
}

/// Number of ticks covering `sample_count` samples, rounded up.
pub fn duration_ticks(sample_count: usize, sample_rate: u32, tick_rate: u32) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    let ticks = sample_count as u128 * tick_rate as u128;
    ticks.div_ceil(sample_rate as u128) as usize
}

/// Tick a frame belongs to: the one containing the first sample of its hop.
pub fn frame_tick(frame_idx: usize, sample_rate: u32, tick_rate: u32) -> usize {
    ((frame_idx * HOP_SIZE) as u128 * tick_rate as u128 / sample_rate as u128) as usize
}

/// Peak-preserving consolidation of hop frames into per-tick dB values.
///
/// Frames falling in the same tick are reduced with `max` so short transients
/// survive. Ticks past the last full window hold the last tick that received a
/// frame; with no frames at all every tick reads [`SILENCE_DB`].
pub fn consolidate(
    frames: &[SpectralFrame],
    sample_rate: u32,
    tick_rate: u32,
    total_ticks: usize,
) -> Vec<[f32; BAND_COUNT]> {
    let mut ticks = vec![[f32::NEG_INFINITY; BAND_COUNT]; total_ticks];
    for (idx, frame) in frames.iter().enumerate() {
        let tick = frame_tick(idx, sample_rate, tick_rate);
        let Some(slot) = ticks.get_mut(tick) else {
            break;
        };
        for (acc, &db) in slot.iter_mut().zip(frame.bands_db.iter()) {
            *acc = acc.max(db);
        }
    }

    let mut held = [SILENCE_DB; BAND_COUNT];
    for slot in ticks.iter_mut() {
        if slot[0] == f32::NEG_INFINITY {
            *slot = held;
        } else {
            held = *slot;
        }
    }
    ticks
}

/// Bands further than this below the song's loudest band read as dark.
pub const DYNAMIC_RANGE_DB: f32 = 60.0;

/// Nothing at or below this counts as content, however quiet the song is.
pub const NOISE_FLOOR_DB: f32 = -80.0;

/// Maps the per-tick dB grid onto gated [0, 1] intensities.
///
/// Level is measured against the loudest band anywhere in the song, so a band
/// carrying only leakage stays dark instead of being stretched to full scale.
/// Onsets are normalised song-wide too and only boost a band as far as its
/// level allows.
pub fn build_timeline(
    ticks_db: &[[f32; BAND_COUNT]],
    config: &AnalysisConfig,
) -> FrequencyTimeline {
    let mut ticks = vec![[0.0f32; BAND_COUNT]; ticks_db.len()];

    let peak = ticks_db.iter().flatten().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = (peak - DYNAMIC_RANGE_DB).max(NOISE_FLOOR_DB);
    if peak <= floor {
        return FrequencyTimeline::from_ticks(config.tick_rate, ticks);
    }
    let span = peak - floor;

    // Bands that never clear the floor get no onset scoring at all.
    let active: Vec<(Band, Vec<f32>, Vec<f32>)> = Band::ALL
        .into_iter()
        .filter_map(|band| {
            let series: Vec<f32> = ticks_db.iter().map(|t| t[band.index()]).collect();
            let band_peak = series.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            (band_peak > floor).then(|| {
                let onsets = detect_onsets(&series);
                (band, series, onsets)
            })
        })
        .collect();

    let peak_onset = active
        .iter()
        .flat_map(|(_, _, onsets)| onsets.iter().copied())
        .fold(0.0f32, f32::max);

    for (band, series, onsets) in &active {
        for (tick, (&db, &onset)) in series.iter().zip(onsets.iter()).enumerate() {
            let level = ((db - floor) / span).clamp(0.0, 1.0);
            let onset = if peak_onset > 0.0 { onset / peak_onset } else { 0.0 };
            ticks[tick][band.index()] = gated_intensity(level, onset, config);
        }
    }

    FrequencyTimeline::from_ticks(config.tick_rate, ticks)
}

fn gated_intensity(level: f32, onset: f32, config: &AnalysisConfig) -> f32 {
    let value = (level * (config.level_weight + onset * config.onset_weight)).clamp(0.0, 1.0);
    if value < config.gate {
        0.0
    } else {
        value
    }
}

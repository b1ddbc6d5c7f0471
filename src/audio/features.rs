use serde::{Deserialize, Serialize};

pub const BAND_COUNT: usize = 12;

/// Mono PCM samples in [-1.0, 1.0] plus their sample rate.
#[derive(Clone, Debug, Default)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds, 0 when the sample rate is unknown.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// The twelve fixed frequency bands, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    SubBass,    // <= 40 Hz
    Bass,       // <= 80 Hz
    UpperBass,  // <= 150 Hz
    LowMid,     // <= 300 Hz
    Mid,        // <= 500 Hz
    UpperMid,   // <= 800 Hz
    HighMid,    // <= 1200 Hz
    LowTreble,  // <= 2000 Hz
    Presence,   // <= 4000 Hz
    Brilliance, // <= 8000 Hz
    Air,        // <= 12000 Hz
    Ultra,      // everything above
}

impl Band {
    pub const ALL: [Band; BAND_COUNT] = [
        Band::SubBass,
        Band::Bass,
        Band::UpperBass,
        Band::LowMid,
        Band::Mid,
        Band::UpperMid,
        Band::HighMid,
        Band::LowTreble,
        Band::Presence,
        Band::Brilliance,
        Band::Air,
        Band::Ultra,
    ];

    /// Upper cutoffs of the first eleven bands; the last band is unbounded.
    pub const CUTOFFS_HZ: [f32; BAND_COUNT - 1] = [
        40.0, 80.0, 150.0, 300.0, 500.0, 800.0, 1200.0, 2000.0, 4000.0, 8000.0, 12000.0,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Band a frequency falls into. A frequency exactly on a cutoff belongs to the lower band.
    pub fn for_frequency(hz: f32) -> Band {
        let idx = Band::CUTOFFS_HZ
            .iter()
            .position(|&cutoff| hz <= cutoff)
            .unwrap_or(BAND_COUNT - 1);
        Band::ALL[idx]
    }

    /// (lower, upper) edges in Hz. The last band reports `f32::INFINITY` as its upper edge.
    pub fn range_hz(self) -> (f32, f32) {
        let i = self.index();
        let low = if i == 0 { 0.0 } else { Band::CUTOFFS_HZ[i - 1] };
        let high = Band::CUTOFFS_HZ.get(i).copied().unwrap_or(f32::INFINITY);
        (low, high)
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::SubBass => "sub_bass",
            Band::Bass => "bass",
            Band::UpperBass => "upper_bass",
            Band::LowMid => "low_mid",
            Band::Mid => "mid",
            Band::UpperMid => "upper_mid",
            Band::HighMid => "high_mid",
            Band::LowTreble => "low_treble",
            Band::Presence => "presence",
            Band::Brilliance => "brilliance",
            Band::Air => "air",
            Band::Ultra => "ultra",
        }
    }
}

/// A queryable lighting channel: one stored band, or the mean of all of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Band(Band),
    All,
}

impl From<Band> for Channel {
    fn from(band: Band) -> Self {
        Channel::Band(band)
    }
}

/// Per-band decibel values for one analysis window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralFrame {
    pub bands_db: [f32; BAND_COUNT],
}

/// Aggregate statistics over a per-tick energy series (dB).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyStatistics {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub range: f32,
    pub std_dev: f32,
}

impl EnergyStatistics {
    pub fn from_series(series: &[f32]) -> Self {
        if series.is_empty() {
            return Self::default();
        }

        let n = series.len() as f32;
        let mean = series.iter().sum::<f32>() / n;
        let min = series.iter().copied().fold(f32::INFINITY, f32::min);
        let max = series.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let variance = series.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;

        Self {
            mean,
            min,
            max,
            range: max - min,
            std_dev: variance.sqrt(),
        }
    }
}

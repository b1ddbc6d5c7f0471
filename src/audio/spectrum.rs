use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::features::{Band, SampleBuffer, SpectralFrame, BAND_COUNT};

pub const WINDOW_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 110;

/// Added to band power before taking the logarithm.
pub const POWER_EPSILON: f32 = 1e-10;

/// Decibel value of a band with no energy at all.
pub const SILENCE_DB: f32 = -100.0;

/// Number of full windows that fit in `len` samples.
pub fn frame_count(len: usize) -> usize {
    if len < WINDOW_SIZE {
        0
    } else {
        (len - WINDOW_SIZE) / HOP_SIZE + 1
    }
}

/// Windowed FFT over the whole buffer, one frame per hop.
///
/// Trailing samples that do not fill a complete window are dropped.
pub fn analyze(buffer: &SampleBuffer) -> Vec<SpectralFrame> {
    let samples = &buffer.samples;
    let count = frame_count(samples.len());
    if count == 0 || buffer.sample_rate == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(WINDOW_SIZE);
    let hann = hann_window(WINDOW_SIZE);
    let bin_bands = bin_band_map(buffer.sample_rate);

    (0..count)
        .into_par_iter()
        .map_init(
            || vec![Complex::new(0.0f32, 0.0); WINDOW_SIZE],
            |fft_buf, frame_idx| {
                let start = frame_idx * HOP_SIZE;
                let window = &samples[start..start + WINDOW_SIZE];
                for (slot, (&s, &w)) in fft_buf.iter_mut().zip(window.iter().zip(hann.iter())) {
                    *slot = Complex::new(s * w, 0.0);
                }
                fft.process(fft_buf);

                let mut power = [0.0f32; BAND_COUNT];
                for (bin, band) in bin_bands.iter().enumerate() {
                    let c = fft_buf[bin];
                    power[band.index()] += c.re * c.re + c.im * c.im;
                }

                SpectralFrame {
                    bands_db: power.map(to_db),
                }
            },
        )
        .collect()
}

/// Power to decibels, guarded against log(0).
pub fn to_db(power: f32) -> f32 {
    10.0 * (power + POWER_EPSILON).log10()
}

/// Inverse of [`to_db`].
pub fn from_db(db: f32) -> f32 {
    (10f32.powf(db / 10.0) - POWER_EPSILON).max(0.0)
}

/// Band of every non-negative-frequency bin, DC through Nyquist.
fn bin_band_map(sample_rate: u32) -> Vec<Band> {
    let bin_hz = sample_rate as f32 / WINDOW_SIZE as f32;
    (0..=WINDOW_SIZE / 2)
        .map(|k| Band::for_frequency(k as f32 * bin_hz))
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

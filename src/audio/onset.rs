//! Onset strength over a per-tick energy series expressed in dB.
//!
//! Four additive passes feed one accumulator: global statistics, a multi-scale
//! local-rise detector, spectral flux with its acceleration, and a slope
//! inversion detector for sustained tones. The output is unnormalised.

use super::features::EnergyStatistics;

/// (window size, weight) pairs, fastest first.
const RISE_SCALES: [(usize, f32); 5] = [(1, 0.35), (2, 0.30), (3, 0.20), (5, 0.10), (8, 0.05)];

/// Local means at or below this are treated as dead air.
const SILENCE_FLOOR_DB: f32 = -80.0;

const MIN_THRESHOLD_DB: f32 = 0.2;
const RANGE_THRESHOLD_FACTOR: f32 = 0.02;
const STD_DEV_THRESHOLD_FACTOR: f32 = 0.15;

const RELATIVE_RISE_TRIGGER: f32 = 0.03;
const PEAK_RELATIVE_RISE_TRIGGER: f32 = 0.02;
const RELATIVE_RISE_SCALE: f32 = 15.0;
const PEAK_BOOST: f32 = 1.2;

const FLUX_WEIGHT: f32 = 0.25;
const ACCELERATION_WEIGHT: f32 = 0.15;

const INFLECTION_MIN_SLOPE: f32 = 0.5;
const INFLECTION_WEIGHT: f32 = 0.1;

/// Onset strength for every index of `energy`. Same length as the input.
pub fn detect_onsets(energy: &[f32]) -> Vec<f32> {
    let mut onsets = vec![0.0f32; energy.len()];
    if energy.is_empty() {
        return onsets;
    }

    let stats = EnergyStatistics::from_series(energy);
    local_rise_pass(energy, &stats, &mut onsets);
    flux_pass(energy, &mut onsets);
    inflection_pass(energy, &mut onsets);
    onsets
}

/// Rise threshold for one series, floored so near-silent tracks don't trigger on noise.
pub fn adaptive_threshold(stats: &EnergyStatistics) -> f32 {
    let scaled = (stats.range * RANGE_THRESHOLD_FACTOR).min(stats.std_dev * STD_DEV_THRESHOLD_FACTOR);
    scaled.max(MIN_THRESHOLD_DB)
}

fn local_rise_pass(energy: &[f32], stats: &EnergyStatistics, onsets: &mut [f32]) {
    let threshold = adaptive_threshold(stats);
    let last = energy.len() - 1;

    for (window, weight) in RISE_SCALES {
        for i in 0..energy.len() {
            let current = energy[i];
            let local_mean = if i >= window {
                energy[i - window..i].iter().sum::<f32>() / window as f32
            } else {
                stats.mean
            };

            let absolute_rise = current - local_mean;
            let relative_rise = if local_mean <= SILENCE_FLOOR_DB {
                0.0
            } else {
                absolute_rise / (local_mean.abs() + 1.0)
            };

            let is_peak = (i == 0 || current >= energy[i - 1]) && (i == last || current >= energy[i + 1]);

            let fires = absolute_rise > threshold
                || relative_rise > RELATIVE_RISE_TRIGGER
                || (is_peak && relative_rise > PEAK_RELATIVE_RISE_TRIGGER);

            if fires {
                let boost = if is_peak { PEAK_BOOST } else { 1.0 };
                onsets[i] += absolute_rise.max(relative_rise * RELATIVE_RISE_SCALE) * weight * boost;
            }
        }
    }
}

fn flux_pass(energy: &[f32], onsets: &mut [f32]) {
    let mut prev_flux = 0.0f32;
    for i in 1..energy.len() {
        let flux = (energy[i] - energy[i - 1]).abs();
        let acceleration = if i >= 2 { (flux - prev_flux).abs() } else { 0.0 };
        onsets[i] += flux * FLUX_WEIGHT + acceleration * ACCELERATION_WEIGHT;
        prev_flux = flux;
    }
}

fn inflection_pass(energy: &[f32], onsets: &mut [f32]) {
    if energy.len() < 5 {
        return;
    }
    for i in 2..energy.len() - 2 {
        let left = (energy[i] - energy[i - 2]) * 0.5;
        let right = (energy[i + 2] - energy[i]) * 0.5;
        if left * right < 0.0 && left.abs() > INFLECTION_MIN_SLOPE {
            onsets[i] += left.abs() * INFLECTION_WEIGHT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_series_yields_empty_output() {
        assert!(detect_onsets(&[]).is_empty());
    }

    #[test]
    fn constant_series_has_no_onsets() {
        for level in [-100.0f32, -42.5, 0.0, 12.0] {
            let onsets = detect_onsets(&vec![level; 64]);
            assert_eq!(onsets.len(), 64);
            assert!(onsets.iter().all(|&v| v == 0.0), "level {level}: {onsets:?}");
        }
    }

    #[test]
    fn upward_step_fires_at_the_step() {
        let step = 40;
        let mut energy = vec![-100.0f32; step];
        energy.extend(std::iter::repeat(-20.0).take(40));

        let onsets = detect_onsets(&energy);
        assert_eq!(onsets.len(), energy.len());
        assert!(onsets[step] > 0.0);

        let (max_idx, _) = onsets
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(max_idx, step);

        // Before the step and once the slowest window has moved past it, nothing fires.
        for &v in &onsets[..step] {
            assert_relative_eq!(v, 0.0);
        }
        for &v in &onsets[step + 9..] {
            assert_relative_eq!(v, 0.0);
        }
    }

    #[test]
    fn threshold_is_floored_for_quiet_tracks() {
        let stats = EnergyStatistics::from_series(&[-60.0, -60.1, -60.0, -59.9]);
        assert_relative_eq!(adaptive_threshold(&stats), MIN_THRESHOLD_DB);

        let stats = EnergyStatistics::from_series(&[-100.0, -20.0]);
        // range 80 * 0.02 = 1.6 beats std dev 40 * 0.15 = 6.0
        assert_relative_eq!(adaptive_threshold(&stats), 1.6, epsilon = 1e-5);
    }

    #[test]
    fn flux_pass_scores_change_and_its_acceleration() {
        let mut onsets = vec![0.0; 4];
        flux_pass(&[0.0, 2.0, 2.0, 2.0], &mut onsets);
        assert_relative_eq!(onsets[0], 0.0);
        assert_relative_eq!(onsets[1], 0.5, epsilon = 1e-6);
        // flux drops from 2 to 0
        assert_relative_eq!(onsets[2], 0.3, epsilon = 1e-6);
        assert_relative_eq!(onsets[3], 0.0);
    }

    #[test]
    fn inflection_pass_catches_slope_reversal() {
        let mut onsets = vec![0.0; 5];
        inflection_pass(&[0.0, 2.0, 4.0, 2.0, 0.0], &mut onsets);
        assert_relative_eq!(onsets[2], 0.2, epsilon = 1e-6);
        assert_eq!(onsets.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn dead_air_suppresses_relative_rise() {
        // A 0.1 dB wiggle under the silence floor stays below the 0.2 dB floor threshold.
        let energy = [-95.0, -95.0, -95.0, -94.9, -95.0, -95.0, -95.0, -95.0, -95.0, -95.0];
        let onsets = detect_onsets(&energy);
        assert!(onsets.iter().all(|&v| v < 0.1), "{onsets:?}");
    }
}

use super::features::SampleBuffer;
use super::spectrum;
use super::timeline::{build_timeline, consolidate, duration_ticks, FrequencyTimeline};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Full pipeline: samples -> spectral frames -> per-tick dB -> gated intensities.
///
/// `progress` is called with values in (0, 1] at stage boundaries.
pub fn analyze_song(
    audio: &SampleBuffer,
    config: &AnalysisConfig,
    mut progress: impl FnMut(f32),
) -> Result<FrequencyTimeline, AnalysisError> {
    validate(audio)?;
    if config.tick_rate == 0 {
        return Err(AnalysisError::InvalidTickRate);
    }

    let total_ticks = duration_ticks(audio.len(), audio.sample_rate, config.tick_rate);
    log::debug!(
        "Spectral pass: {} samples @ {}Hz, {} ticks",
        audio.len(),
        audio.sample_rate,
        total_ticks
    );
    let frames = spectrum::analyze(audio);
    progress(0.7);

    log::debug!("Consolidating {} frames into {} ticks", frames.len(), total_ticks);
    let ticks_db = consolidate(&frames, audio.sample_rate, config.tick_rate, total_ticks);
    progress(0.85);

    let timeline = build_timeline(&ticks_db, config);
    progress(1.0);

    Ok(timeline)
}

fn validate(audio: &SampleBuffer) -> Result<(), AnalysisError> {
    if audio.sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(audio.sample_rate));
    }
    if audio.is_empty() {
        return Err(AnalysisError::EmptyBuffer);
    }
    if let Some(index) = audio.samples.iter().position(|s| !s.is_finite()) {
        return Err(AnalysisError::NonFiniteSample { index });
    }
    Ok(())
}

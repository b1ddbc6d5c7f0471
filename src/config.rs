use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Tick rate and the dB-to-intensity mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Host ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    /// Share of a band's level that lights it on its own. Keep it at or above
    /// `lit_threshold` or sustained tones never light.
    #[serde(default = "default_level_weight")]
    pub level_weight: f32,
    /// Extra share an onset adds, scaled by the band's level.
    #[serde(default = "default_onset_weight")]
    pub onset_weight: f32,
    /// Intensities below this are written as 0.
    #[serde(default = "default_gate")]
    pub gate: f32,
    /// Cutoff for the on/off lighting signal.
    #[serde(default = "default_lit_threshold")]
    pub lit_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_timeout_secs: u64,
    /// Revert a slot to empty when its analysis fails instead of leaving it loading.
    #[serde(default)]
    pub drop_failed_songs: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            level_weight: default_level_weight(),
            onset_weight: default_onset_weight(),
            gate: default_gate(),
            lit_threshold: default_lit_threshold(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_secs: default_analysis_timeout_secs(),
            drop_failed_songs: false,
        }
    }
}

fn default_tick_rate() -> u32 { 20 }
fn default_level_weight() -> f32 { 0.7 }
fn default_onset_weight() -> f32 { 0.3 }
fn default_gate() -> f32 { 0.1 }
fn default_lit_threshold() -> f32 { 0.5 }
fn default_analysis_timeout_secs() -> u64 { 30 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analysis.tick_rate, 20);
        assert_eq!(config.playback.analysis_timeout_secs, 30);
        assert!(!config.playback.drop_failed_songs);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            "[analysis]\ntick_rate = 40\ngate = 0.2\n\n[playback]\ndrop_failed_songs = true\n",
        )
        .unwrap();
        assert_eq!(config.analysis.tick_rate, 40);
        assert_eq!(config.analysis.gate, 0.2);
        assert_eq!(config.analysis.level_weight, 0.7);
        assert!(config.playback.drop_failed_songs);
    }

    #[test]
    fn default_level_alone_can_light_a_band() {
        let analysis = AnalysisConfig::default();
        assert!(analysis.level_weight >= analysis.lit_threshold);
        assert!(analysis.level_weight + analysis.onset_weight <= 1.0 + f32::EPSILON);
    }
}

pub mod analysis;
pub mod decode;
pub mod features;
pub mod onset;
pub mod source;
pub mod spectrum;
pub mod timeline;

pub use analysis::analyze_song;
pub use features::{Band, Channel, EnergyStatistics, SampleBuffer, SpectralFrame, BAND_COUNT};
pub use onset::detect_onsets;
pub use source::{AudioSource, FileSource, MemorySource, SongRef};
pub use timeline::FrequencyTimeline;

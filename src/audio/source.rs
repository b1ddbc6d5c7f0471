use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::decode::decode_file;
use super::features::SampleBuffer;
use crate::error::AnalysisError;

/// Opaque reference to a song's audio, resolved by an [`AudioSource`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongRef(pub String);

impl SongRef {
    pub fn new(reference: impl Into<String>) -> Self {
        SongRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies decoded mono audio for a song. Called from analysis workers.
pub trait AudioSource: Send + Sync {
    fn load(&self, song: &SongRef) -> Result<Arc<SampleBuffer>, AnalysisError>;
}

/// Treats every [`SongRef`] as a filesystem path.
#[derive(Debug, Default, Clone)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative references against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, song: &SongRef) -> PathBuf {
        match &self.root {
            Some(root) => root.join(song.as_str()),
            None => PathBuf::from(song.as_str()),
        }
    }
}

impl AudioSource for FileSource {
    fn load(&self, song: &SongRef) -> Result<Arc<SampleBuffer>, AnalysisError> {
        decode_file(&self.resolve(song))
            .map(Arc::new)
            .map_err(|e| AnalysisError::source_failed(format!("{e:#}")))
    }
}

/// In-memory source of already decoded buffers.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    songs: HashMap<SongRef, Arc<SampleBuffer>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, song: SongRef, audio: SampleBuffer) {
        self.songs.insert(song, Arc::new(audio));
    }

    pub fn with(mut self, song: SongRef, audio: SampleBuffer) -> Self {
        self.insert(song, audio);
        self
    }
}

impl AudioSource for MemorySource {
    fn load(&self, song: &SongRef) -> Result<Arc<SampleBuffer>, AnalysisError> {
        self.songs
            .get(song)
            .cloned()
            .ok_or_else(|| AnalysisError::source_failed(format!("unknown song: {song}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_resolves_known_songs_only() {
        let source = MemorySource::new().with(SongRef::new("a"), SampleBuffer::new(vec![0.5; 8], 8_000));
        assert_eq!(source.load(&SongRef::new("a")).unwrap().len(), 8);
        assert!(matches!(source.load(&SongRef::new("b")), Err(AnalysisError::Source(_))));
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let source = FileSource::with_root("/nonexistent-beatglow-dir");
        let err = source.load(&SongRef::new("song.ogg")).unwrap_err();
        assert!(matches!(err, AnalysisError::Source(msg) if msg.contains("song.ogg")));
    }
}

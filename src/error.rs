use thiserror::Error;

use crate::playback::state::{Command, PlaybackState};

/// Why an analysis task produced no timeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("sample buffer is empty")]
    EmptyBuffer,

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("tick rate must be positive")]
    InvalidTickRate,

    #[error("non-finite sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error("audio source failed: {0}")]
    Source(String),

    #[error("analysis worker panicked")]
    WorkerPanicked,
}

impl AnalysisError {
    pub fn source_failed(reason: impl Into<String>) -> Self {
        AnalysisError::Source(reason.into())
    }
}

/// A playback command that was refused. The slot is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {command} while {state}")]
    Illegal {
        command: Command,
        state: PlaybackState,
    },
}

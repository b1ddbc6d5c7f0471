//! Per-slot playback state, shared between an authoritative server tracker
//! and any number of client mirrors.

pub mod client;
pub mod executor;
pub mod identity;
pub mod message;
pub mod server;
pub mod slot;
pub mod state;
pub mod store;
mod tracker;

/// Host game tick. Signed so offsets before a song's start stay representable.
pub type Tick = i64;

pub use client::ClientTracker;
pub use executor::{Executor, InlineExecutor, ManualExecutor, RayonExecutor};
pub use identity::SongIdentity;
pub use message::SlotUpdate;
pub use server::ServerTracker;
pub use slot::SlotPos;
pub use state::{Command, PlaybackRecord, PlaybackState};
pub use store::{SlotEntry, SlotStore};
pub use tracker::AnalysisOutcome;

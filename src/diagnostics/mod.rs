//! Playback status snapshots and the periodic reporter thread.

pub mod reporter;
pub mod status;

pub use reporter::StatusReporter;
pub use status::PlaybackStatus;

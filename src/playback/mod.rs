//! The three-worker playback pipeline and its shared context.

pub mod context;
pub mod pipeline;
pub mod worker;
pub mod workers;

pub use context::PlaybackContext;
pub use pipeline::PlaybackPipeline;
pub use worker::{StateChangeHandle, Worker, WorkerAgent, WorkerState};
pub use workers::MediaWorkerSet;

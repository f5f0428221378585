//! Time-stamped media blocks and the pooled per-kind block buffer.

pub mod block;
pub mod buffer;

pub use block::{BlockPayload, FrameConverter, MediaBlock, MediaKind, SourceFrame};
pub use buffer::BlockBuffer;

//! Reusable concurrency primitives shared by buffers and workers.

pub mod atomics;
pub mod events;
pub mod locking;
pub mod ring_buffer;

pub use atomics::{AtomicCounter, AtomicF64, AtomicFlag, AtomicTimeCell};
pub use events::{CancellationToken, CancellationTokenOwner, WaitEvent};
pub use locking::SyncLocker;
pub use ring_buffer::CircularBuffer;

//! Real-time clocks and the per-kind timing controller.

pub mod clock;
pub mod controller;

pub use clock::RealTimeClock;
pub use controller::{TimingController, TimingSetup};

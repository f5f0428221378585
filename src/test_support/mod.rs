//! Scripted collaborator fakes for exercising the pipeline without a real
//! demuxer, decoder, or platform renderer.
//!
//! These are part of the public surface so hosts can smoke-test their own
//! wiring against the same doubles the crate's test suite uses.

pub mod fakes;
pub mod fixture;

pub use fakes::{
    CountingRenderer, ManualCommands, PassthroughConverter, RecordingReporter, ScriptedComponent,
    ScriptedContainer,
};
pub use fixture::Fixture;

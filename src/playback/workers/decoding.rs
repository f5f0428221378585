//! Frame decoding worker.
//!
//! Converts decoded frames into block-buffer entries per kind, either
//! serially or on scoped threads, and detects the natural end of decoding.

use std::sync::Arc;

use log::info;

use crate::blocks::MediaKind;
use crate::error::PlaybackError;
use crate::playback::context::PlaybackContext;
use crate::playback::worker::WorkerAgent;
use crate::tools::events::CancellationToken;

pub struct FrameDecodingAgent {
    context: Arc<PlaybackContext>,
}

impl FrameDecodingAgent {
    pub fn new(context: Arc<PlaybackContext>) -> Self {
        Self { context }
    }

    /// Fill `kind`'s block buffer until it is comfortably ahead of the
    /// playback position, frames run out, or the cycle is cancelled.
    ///
    /// Returns how many blocks were added.
    pub fn decode_component_blocks(&self, kind: MediaKind, token: &CancellationToken) -> usize {
        let Some(blocks) = self.context.blocks(kind) else {
            return 0;
        };
        let limit = blocks.capacity();
        let mut added = 0;
        loop {
            let position = self.context.timing.position(Some(kind));
            if blocks.is_full() && position < blocks.range_mid() {
                break;
            }
            if token.is_cancelled() {
                break;
            }
            if self.add_next_block(kind).is_none() {
                break;
            }
            added += 1;
            if added >= limit {
                break;
            }
        }
        added
    }

    fn add_next_block(&self, kind: MediaKind) -> Option<usize> {
        let component = self.context.container.component(kind)?;
        let frame = component.receive_next_frame()?;
        let blocks = self.context.blocks(kind)?;
        blocks
            .add(&frame, self.context.converter.as_ref())
            .map(|block| block.index())
    }

    fn can_read_more_frames_of(&self, kind: MediaKind) -> bool {
        let component = match self.context.container.component(kind) {
            Some(component) => component,
            None => return false,
        };
        component.buffer_length() > 0
            || component.has_packets_in_codec()
            || self.context.container.should_read_more_packets()
    }
}

impl WorkerAgent for FrameDecodingAgent {
    fn execute_cycle(&mut self, token: &CancellationToken) -> Result<(), PlaybackError> {
        let context = &self.context;
        let mut added_total = 0;

        if !context.has_decoding_ended.value() && !token.is_cancelled() {
            let kinds = context.kinds();
            let parallel = context.options.use_parallel_decoding
                || context.timing.has_disconnected_clocks();
            if parallel {
                let this: &FrameDecodingAgent = self;
                std::thread::scope(|scope| {
                    let handles: Vec<_> = kinds
                        .iter()
                        .map(|&kind| scope.spawn(move || this.decode_component_blocks(kind, token)))
                        .collect();
                    for handle in handles {
                        added_total += handle.join().unwrap_or(0);
                    }
                });
            } else {
                for kind in kinds {
                    added_total += self.decode_component_blocks(kind, token);
                }
            }

            let bitrate: u64 = context
                .kinds()
                .into_iter()
                .filter_map(|kind| context.blocks(kind))
                .map(|blocks| blocks.range_bitrate())
                .sum();
            context.state.update_decoding_bitrate(bitrate);

            let ended = added_total == 0 && !self.can_read_more_frames_of(context.main_kind());
            if ended && !context.has_decoding_ended.value() {
                info!("frame decoding has ended");
            }
            context.has_decoding_ended.set(ended);
        }
        Ok(())
    }
}

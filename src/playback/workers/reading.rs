//! Packet reading worker.
//!
//! Drives the demuxer while its packet queues run low and otherwise sleeps
//! on the container's buffer-changed event. Read failures are swallowed so
//! a corrupt packet never kills the pipeline; decoding simply ends when no
//! more frames arrive.

use std::sync::Arc;

use log::{debug, info};

use crate::constants::BUFFER_CHANGED_WAIT;
use crate::error::PlaybackError;
use crate::playback::context::PlaybackContext;
use crate::playback::worker::WorkerAgent;
use crate::tools::events::CancellationToken;

pub struct PacketReadingAgent {
    context: Arc<PlaybackContext>,
}

impl PacketReadingAgent {
    pub fn new(context: Arc<PlaybackContext>) -> Self {
        Self { context }
    }
}

impl WorkerAgent for PacketReadingAgent {
    fn execute_cycle(&mut self, token: &CancellationToken) -> Result<(), PlaybackError> {
        let container = &self.context.container;
        while container.should_read_more_packets() && !token.is_cancelled() {
            if container.has_enough_packets() {
                break;
            }
            if let Err(error) = container.read() {
                debug!("packet read swallowed: {}", error);
            }
        }

        self.context.state.update_buffering_stats(
            container.buffer_length(),
            container.packet_count(),
            container.packet_count_threshold(),
        );

        if self.context.is_sync_buffering.value() && self.context.can_exit_sync_buffering() {
            self.context.is_sync_buffering.set(false);
            info!("sync buffering cleared by packet reader");
        }
        Ok(())
    }

    fn cycle_delay(&mut self, _delay: Option<std::time::Duration>, token: &CancellationToken) {
        let changed = self.context.container.packet_buffer_changed();
        changed.begin();
        loop {
            if self.context.container.should_read_more_packets() {
                break;
            }
            if self.context.is_sync_buffering.value() {
                break;
            }
            if changed.wait_timeout(BUFFER_CHANGED_WAIT) {
                break;
            }
            if token.is_cancelled() {
                break;
            }
        }
    }
}

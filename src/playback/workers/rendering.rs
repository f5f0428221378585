//! Block rendering worker.
//!
//! The coordinator of the pipeline: every cycle it aligns the clocks to the
//! decoded data, manages sync-buffering, hands the block under the playback
//! position to each renderer, and detects the end of media.

use std::sync::Arc;

use log::{info, warn};

use crate::blocks::{MediaBlock, MediaKind};
use crate::constants::HIGH_PRIORITY_PERIOD;
use crate::container::{MediaState, SeekMode};
use crate::error::PlaybackError;
use crate::playback::context::PlaybackContext;
use crate::playback::worker::WorkerAgent;
use crate::time::MediaTime;
use crate::tools::events::CancellationToken;

pub struct BlockRenderingAgent {
    context: Arc<PlaybackContext>,
}

impl BlockRenderingAgent {
    pub fn new(context: Arc<PlaybackContext>) -> Self {
        Self { context }
    }

    /// One-time wait for every renderer to accept blocks.
    fn initialize(&self) {
        if self.context.has_initialized.value() {
            return;
        }
        for kind in self.context.kinds() {
            if let Some(renderer) = self.context.renderer(kind) {
                renderer.wait_for_ready_state();
            }
        }
        self.context
            .state
            .update_playback_start_time(self.context.timing.position(None));
        self.context.has_initialized.set(true);
        info!("renderers ready, playback initialized");
    }

    /// Hold the cycle while an active seek waits for its target blocks.
    fn wait_for_seek_blocks(&self, token: &CancellationToken) {
        let Some(main_blocks) = self.context.main_blocks() else {
            return;
        };
        let main = self.context.main_kind();
        loop {
            if !self.context.commands.is_actively_seeking() {
                break;
            }
            if main_blocks.is_in_range(self.context.timing.position(Some(main))) {
                break;
            }
            let landed = self
                .context
                .commands
                .wait_for_seek_blocks(HIGH_PRIORITY_PERIOD);
            // Normal seeks give up rather than stall user-visible seeking;
            // precise seeks keep holding until the target blocks land.
            if self.context.commands.active_seek_mode() == SeekMode::Normal && !landed {
                break;
            }
            if token.is_cancelled() {
                break;
            }
        }
    }

    /// Keep each clock inside the span of decoded data.
    fn align_clocks_to_playback(&self) {
        let context = &self.context;
        if context.timing.has_disconnected_clocks() {
            for kind in context.kinds() {
                if kind == MediaKind::Subtitle {
                    continue;
                }
                let Some(blocks) = context.blocks(kind) else {
                    continue;
                };
                if blocks.count() == 0 {
                    context.timing.pause(Some(kind));
                    continue;
                }
                let position = context.timing.position(Some(kind));
                if position < blocks.range_start() {
                    context.timing.update(blocks.range_start(), Some(kind));
                } else if position > blocks.range_end() {
                    // Audio keeps running so its device clock never starves.
                    if kind != MediaKind::Audio {
                        context.timing.pause(Some(kind));
                    }
                    context.timing.update(blocks.range_end(), Some(kind));
                }
            }
            return;
        }

        let Some(main_blocks) = context.main_blocks() else {
            return;
        };
        let position = context.timing.position(None);
        let range = main_blocks.range_percent(position);
        if range > 1.0 {
            context.timing.pause(None);
            context.timing.update(main_blocks.range_end(), None);
        } else if range < 0.0 {
            context.timing.update(main_blocks.range_start(), None);
        } else if range == 0.0 && main_blocks.count() == 0 && context.timing.is_running() {
            context.timing.pause(None);
        }
    }

    /// Pause the clock when a lagging component has fallen entirely behind
    /// the main buffered range.
    ///
    /// Returns `true` when sync-buffering was entered this cycle.
    fn enter_sync_buffering(&self) -> bool {
        let context = &self.context;
        if context.is_sync_buffering.value()
            || context.commands.has_pending_commands()
            || context.state.media_state() != MediaState::Play
            || context.timing.has_disconnected_clocks()
        {
            return false;
        }
        let Some(main_blocks) = context.main_blocks() else {
            return false;
        };
        for kind in context.lagging_candidate_kinds() {
            let Some(blocks) = context.blocks(kind) else {
                continue;
            };
            if blocks.range_end() < main_blocks.range_start() {
                context.timing.pause(None);
                context.is_sync_buffering.set(true);
                info!(
                    "sync buffering entered: {} lags the {} range",
                    kind.name(),
                    context.main_kind().name()
                );
                return true;
            }
        }
        false
    }

    /// Deliver the current block of every kind to its renderer.
    fn render_all(&self) {
        let kinds = self.context.kinds();
        if self.context.options.use_parallel_rendering {
            let this: &BlockRenderingAgent = self;
            std::thread::scope(|scope| {
                let handles: Vec<_> = kinds
                    .iter()
                    .map(|&kind| scope.spawn(move || this.render_block(kind)))
                    .collect();
                for handle in handles {
                    let _ = handle.join();
                }
            });
        } else {
            for kind in kinds {
                self.render_block(kind);
            }
        }
    }

    /// Deliver `kind`'s current block; always notify the renderer of the
    /// position, even when no block goes out.
    fn render_block(&self, kind: MediaKind) -> usize {
        let context = &self.context;
        // While commands are in flight only video output matters; anything
        // else would fight the seek.
        if context.commands.has_pending_commands() && kind != MediaKind::Video {
            return 0;
        }
        let position = context.timing.position(Some(kind));
        let preloaded = if kind == MediaKind::Subtitle {
            context.preloaded_subtitles()
        } else {
            None
        };
        let current = match preloaded {
            Some(preloaded) => preloaded.block_at(position),
            None => context
                .blocks(kind)
                .and_then(|blocks| blocks.block_at(position)),
        };

        let delivered = self.send_block_to_renderer(kind, current, position);
        if let Some(renderer) = context.renderer(kind) {
            renderer.update(position);
        }
        delivered
    }

    /// Hand one block to the external renderer unless it was already
    /// delivered and this kind does not require repeats.
    fn send_block_to_renderer(
        &self,
        kind: MediaKind,
        block: Option<Arc<MediaBlock>>,
        position: MediaTime,
    ) -> usize {
        let context = &self.context;
        let Some(block) = block else {
            return 0;
        };
        if block.is_disposed() {
            return 0;
        }

        let last = context.last_render_time(kind);
        if last != MediaTime::MIN
            && last == block.start_time
            && !context.requires_repeated_delivery(kind)
        {
            return 0;
        }

        context.set_last_render_time(kind, block.start_time);
        if let Some(buffer) = context.blocks(kind) {
            context.state.update_dynamic_block_properties(&block, buffer);
        }
        if let Some(renderer) = context.renderer(kind) {
            renderer.render(&block, position);
            1
        } else {
            0
        }
    }

    /// End-of-media detection against the last buffered block or the
    /// container-reported end.
    fn detect_playback_ended(&self) {
        let context = &self.context;
        let Some(main_blocks) = context.main_blocks() else {
            return;
        };
        let main = context.main_kind();
        let end_clock = if main_blocks.count() > 0 {
            main_blocks.range_end()
        } else {
            context
                .container
                .playback_end_time()
                .unwrap_or(MediaTime::MAX)
        };
        let position = context.timing.position(Some(main));
        let at_end = position >= end_clock || context.timing.has_disconnected_clocks();

        if !context.commands.has_pending_commands()
            && context.has_decoding_ended.value()
            && at_end
        {
            if !context.state.has_media_ended() {
                let end_position = if end_clock == MediaTime::MAX {
                    position
                } else {
                    end_clock
                };
                info!("media ended at {}", end_position);
                context.timing.pause(None);
                context.timing.update(end_position, None);
                context.state.update_media_ended(true, end_position);
                context.state.update_media_state(MediaState::Stop);
                context.state.invalidate_renderers();
            }
        } else {
            context.state.update_media_ended(false, MediaTime::ZERO);
        }
    }

    /// Leave sync-buffering when forced to or when lagging components have
    /// caught up past the main range midpoint.
    fn exit_sync_buffering(&self, token: &CancellationToken) {
        let context = &self.context;
        if !context.is_sync_buffering.value() {
            return;
        }
        let must_exit = token.is_cancelled()
            || context.has_decoding_ended.value()
            || context.commands.has_pending_commands()
            || context.timing.has_disconnected_clocks();
        if must_exit || context.can_exit_sync_buffering() {
            self.align_clocks_to_playback();
            context.is_sync_buffering.set(false);
            info!("sync buffering exited");
        }
    }

    /// Publish the playback position and restart the clock when nothing
    /// holds it back.
    fn report_and_resume_playback(&self) {
        let context = &self.context;
        let pending = context.commands.has_pending_commands();
        let syncing = context.is_sync_buffering.value();
        if !pending && !syncing {
            context
                .state
                .report_playback_position(context.timing.position(None));
        }

        let Some(main_blocks) = context.main_blocks() else {
            return;
        };
        if context.state.media_state() != MediaState::Play
            || syncing
            || pending
            || main_blocks.count() == 0
        {
            return;
        }
        let min_percent = context.options.min_playback_buffer_percent;
        if min_percent > 0.0
            && context.container.should_read_more_packets()
            && !context.container.has_enough_packets()
            && context.state.buffering_progress() < min_percent
        {
            return;
        }
        context.timing.play(None);
    }
}

impl WorkerAgent for BlockRenderingAgent {
    fn execute_cycle(&mut self, token: &CancellationToken) -> Result<(), PlaybackError> {
        self.initialize();

        let main_has_blocks = self
            .context
            .main_blocks()
            .map(|blocks| blocks.count() > 0)
            .unwrap_or(false);
        if !main_has_blocks {
            return Ok(());
        }

        if self.context.commands.is_actively_seeking() {
            self.wait_for_seek_blocks(token);
        }

        self.align_clocks_to_playback();

        let buffering_entered = self.enter_sync_buffering();
        if !buffering_entered {
            self.render_all();
        }

        self.detect_playback_ended();
        self.exit_sync_buffering(token);
        self.report_and_resume_playback();
        Ok(())
    }

    fn on_cycle_error(&mut self, error: &PlaybackError) {
        warn!("block rendering cycle failed: {}", error);
    }
}

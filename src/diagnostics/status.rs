//! Serializable snapshot of observable playback state.

use serde::Serialize;

use crate::container::MediaState;
use crate::playback::context::PlaybackContext;
use crate::time::MediaTime;

/// Snapshot of playback state sent to UI and diagnostics consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    /// Reference playback position in microseconds.
    pub position: MediaTime,
    pub media_state: MediaState,
    pub buffering_progress: f64,
    /// Compressed bitrate across all buffered block ranges, bits/second.
    pub decoding_bitrate: u64,
    pub is_sync_buffering: bool,
    pub has_media_ended: bool,
    pub has_disconnected_clocks: bool,
    pub speed_ratio: f64,
}

impl PlaybackStatus {
    /// Capture the current state of a playback context.
    pub fn capture(context: &PlaybackContext) -> Self {
        let decoding_bitrate = context
            .kinds()
            .into_iter()
            .filter_map(|kind| context.blocks(kind))
            .map(|blocks| blocks.range_bitrate())
            .sum();
        Self {
            position: context.timing.position(None),
            media_state: context.state.media_state(),
            buffering_progress: context.state.buffering_progress(),
            decoding_bitrate,
            is_sync_buffering: context.is_sync_buffering.value(),
            has_media_ended: context.state.has_media_ended(),
            has_disconnected_clocks: context.timing.has_disconnected_clocks(),
            speed_ratio: context.timing.speed_ratio(),
        }
    }

    /// JSON encoding for host bindings that consume strings.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::MediaKind;
    use crate::test_support::fixture::Fixture;

    #[test]
    fn captures_context_state() {
        let fixture = Fixture::audio_video();
        fixture.fill_blocks(MediaKind::Video, 0, 40, 4);
        fixture.timing.update(MediaTime::from_millis(60), None);

        let status = PlaybackStatus::capture(&fixture.context);
        assert_eq!(status.position, MediaTime::from_millis(60));
        assert_eq!(status.media_state, MediaState::Stop);
        assert!(status.decoding_bitrate > 0);
        assert!(!status.is_sync_buffering);
        assert_eq!(status.speed_ratio, 1.0);
    }

    #[test]
    fn serializes_to_json() {
        let fixture = Fixture::audio_video();
        let status = PlaybackStatus::capture(&fixture.context);
        let json = status.to_json();
        assert!(json.contains("\"media_state\":\"Stop\""));
        assert!(json.contains("\"position\":0"));
    }
}

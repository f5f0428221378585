//! Error type for playback coordination operations.

use std::fmt::{Display, Formatter};

/// Error type shared across buffers, workers, and the timing controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// A ring-buffer write without overwrite did not fit.
    NoRoom {
        requested: usize,
        writable: usize,
    },
    /// A ring-buffer read, skip, or rewind asked for more than is available.
    NotEnoughData {
        requested: usize,
        available: usize,
    },
    /// An operation was attempted on a disposed component.
    Disposed(&'static str),
    /// A state change was requested that the current state does not accept.
    InvalidState {
        operation: &'static str,
        state: String,
    },
    /// The demuxer failed to read from the media container.
    Container(String),
    /// A timed lock or wait expired.
    Timeout,
}

impl Display for PlaybackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRoom {
                requested,
                writable,
            } => write!(
                f,
                "no room: {} bytes requested, {} writable",
                requested, writable
            ),
            Self::NotEnoughData {
                requested,
                available,
            } => write!(
                f,
                "not enough data: {} bytes requested, {} available",
                requested, available
            ),
            Self::Disposed(what) => write!(f, "{} is disposed", what),
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {} while in state {}", operation, state)
            }
            Self::Container(err) => write!(f, "container error: {}", err),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for PlaybackError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_buffer_errors() {
        let err = PlaybackError::NoRoom {
            requested: 12,
            writable: 4,
        };
        assert_eq!(err.to_string(), "no room: 12 bytes requested, 4 writable");

        let err = PlaybackError::Disposed("block buffer");
        assert_eq!(err.to_string(), "block buffer is disposed");
    }
}

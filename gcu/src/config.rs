//! Session configuration.
use crate::protocol::FrameSize;
use std::time::Duration;

/// Default time to wait for a TCP connection to the GCU.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to wait for a reply to each command.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a [GcuController][crate::GcuController] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum time to wait for the GCU to accept a TCP connection.
    pub connect_timeout: Duration,

    /// Maximum time to wait for a complete reply to a command.
    ///
    /// If this elapses, the command fails with
    /// [`Error::ReadTimeout`][crate::Error::ReadTimeout], and the session
    /// stays open.
    pub reply_timeout: Duration,

    /// Size of the camera's video frame, in pixels.
    ///
    /// Region commands are normalised against this, and are rejected when it
    /// is [None].
    pub frame_size: Option<FrameSize>,

    /// Check the checksum of every reply before decoding it.
    ///
    /// Off by default.
    pub verify_reply_checksum: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            frame_size: None,
            verify_reply_checksum: false,
        }
    }
}

impl SessionConfig {
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub fn with_frame_size(mut self, frame_size: FrameSize) -> Self {
        self.frame_size = Some(frame_size);
        self
    }

    pub fn with_verify_reply_checksum(mut self, verify_reply_checksum: bool) -> Self {
        self.verify_reply_checksum = verify_reply_checksum;
        self
    }
}

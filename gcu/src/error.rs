use std::io::Error as IoError;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    /// The GCU could not be reached.
    #[error("cannot connect to GCU: {0}")]
    Connection(#[source] IoError),

    /// The stream failed while sending a command or reading its reply.
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("timeout waiting for reply")]
    ReadTimeout,

    #[error("disconnected")]
    Disconnected,

    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),
}

impl Error {
    /// Returns `true` if the session was closed because of this error.
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }

    /// Returns `true` if the GCU sent a reply which could not be decoded.
    ///
    /// The session remains usable after these errors.
    pub const fn is_decode_error(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_decode_error(),
            _ => false,
        }
    }
}

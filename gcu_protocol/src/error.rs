use thiserror::Error;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error("frame too short: {length} bytes")]
    ShortFrame { length: usize },

    #[error("bad frame header: {0:02x?}")]
    BadHeader([u8; 2]),

    #[error("checksum mismatch: frame has {actual:#06x}, calculated {expected:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("video frame size is missing or zero")]
    InvalidFrameSize,

    #[error("opcode {0:#04x} requires a region")]
    MissingRegion(u8),

    #[error("opcode {opcode:#04x} does not take a region with parameters {parameters:02x?}")]
    UnrecognisedRegionParameters { opcode: u8, parameters: Vec<u8> },

    #[error("opcode {0:#04x} does not accept this payload")]
    UnexpectedPayload(u8),

    #[error("parameter out of valid range")]
    ParameterOutOfRange,

    #[error("invalid length")]
    InvalidLength,

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),
}

impl Error {
    /// Returns `true` if this error was raised while checking or decoding a
    /// frame received from the GCU.
    pub const fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::ShortFrame { .. } | Self::BadHeader(_) | Self::ChecksumMismatch { .. }
        )
    }
}

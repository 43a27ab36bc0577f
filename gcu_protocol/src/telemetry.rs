//! # Telemetry replies
//!
//! The GCU answers every [command frame][crate::CommandFrame] with a fixed
//! layout reply, which reports the gimbal's current attitude, the laser
//! rangefinder's target distance and the camera's zoom ratio.
//!
//! ## Frame format
//!
//! Offset | Size | Field
//! ------ | ---- | -----
//! `0`    | 2    | marker, `8A 5E`
//! `2`    | 2    | `u16`: total frame length, including the checksum
//! `4`    | 1    | protocol version, `02`
//! `16`   | 2    | `i16`: yaw, relative, 0.01°
//! `18`   | 2    | `i16`: roll, absolute, 0.01°
//! `20`   | 2    | `i16`: pitch, absolute, 0.01°
//! `43`   | 4    | `u32`: target distance, 0.1 m
//! `59`   | 2    | `u16`: zoom ratio, 0.1×
//! `70`   | 2    | `u16` (big-endian): [checksum][crate::checksum]
//!
//! Everything else is reserved. Replies are at least [TELEMETRY_LENGTH]
//! bytes; any bytes after the fields above are ignored by
//! [`Telemetry::decode()`].
//!
//! Replies are not checked against their checksum unless
//! [verify_reply_checksum] is called explicitly.
use crate::{
    checksum::{checksum, Crc16Stream, CHECKSUM_LENGTH},
    frame::PROTOCOL_VERSION,
    Error, Result,
};
use binrw::{binrw, BinRead, BinWrite};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{fmt::Display, io::Cursor};

/// Marker at the start of every reply from the GCU.
pub const REPLY_MARKER: [u8; 2] = [0x8a, 0x5e];

/// Minimum length of a telemetry reply.
pub const TELEMETRY_LENGTH: usize = 72;

/// Decoded telemetry reply.
///
/// Values are kept as they were transmitted; use the accessor methods for
/// scaled values.
#[binrw]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[brw(little, stream = s)]
#[bw(map_stream = Crc16Stream::new)]
pub struct Telemetry {
    #[br(temp, assert(marker == REPLY_MARKER))]
    #[bw(calc = REPLY_MARKER)]
    marker: [u8; 2],

    #[br(temp)]
    #[bw(calc = TELEMETRY_LENGTH as u16)]
    length: u16,

    #[br(temp)]
    #[bw(calc = PROTOCOL_VERSION)]
    version: u8,

    #[br(temp)]
    #[bw(calc = [0; 11])]
    reserved_05: [u8; 11],

    /// Yaw relative to the mount, in hundredths of a degree.
    pub yaw: i16,

    /// Absolute roll, in hundredths of a degree.
    pub roll: i16,

    /// Absolute pitch, in hundredths of a degree.
    pub pitch: i16,

    #[br(temp)]
    #[bw(calc = [0; 21])]
    reserved_16: [u8; 21],

    /// Rangefinder target distance, in tenths of a metre.
    pub target_distance: u32,

    #[br(temp)]
    #[bw(calc = [0; 12])]
    reserved_2f: [u8; 12],

    /// Camera zoom ratio, in tenths.
    pub zoom: u16,

    #[br(temp)]
    #[bw(calc = [0; 9])]
    reserved_3d: [u8; 9],

    #[br(temp)]
    #[bw(calc = s.checksum())]
    #[brw(big)]
    checksum: u16,
}

impl Telemetry {
    /// Decodes a reply from the GCU.
    ///
    /// ## Errors
    ///
    /// * [`Error::ShortFrame`] if `reply` is shorter than [TELEMETRY_LENGTH]
    /// * [`Error::BadHeader`] if `reply` does not start with [REPLY_MARKER]
    pub fn decode(reply: &[u8]) -> Result<Self> {
        if reply.len() < TELEMETRY_LENGTH {
            return Err(Error::ShortFrame {
                length: reply.len(),
            });
        }

        let marker = [reply[0], reply[1]];
        if marker != REPLY_MARKER {
            return Err(Error::BadHeader(marker));
        }

        Ok(Self::read(&mut Cursor::new(reply))?)
    }

    /// Serialises a [TELEMETRY_LENGTH] byte reply, as the GCU would send it.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::with_capacity(TELEMETRY_LENGTH));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    pub fn yaw_degrees(&self) -> f64 {
        f64::from(self.yaw) / 100.
    }

    pub fn roll_degrees(&self) -> f64 {
        f64::from(self.roll) / 100.
    }

    pub fn pitch_degrees(&self) -> f64 {
        f64::from(self.pitch) / 100.
    }

    pub fn target_distance_metres(&self) -> f64 {
        f64::from(self.target_distance) / 10.
    }

    pub fn zoom_ratio(&self) -> f64 {
        f64::from(self.zoom) / 10.
    }
}

impl Display for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "roll={:.2}° pitch={:.2}° yaw={:.2}° zoom={:.1}× target={:.1}m",
            self.roll_degrees(),
            self.pitch_degrees(),
            self.yaw_degrees(),
            self.zoom_ratio(),
            self.target_distance_metres(),
        )
    }
}

/// Checks the checksum of a reply from the GCU.
///
/// The checksum is read from the last two bytes covered by the reply's length
/// field, and compared with the checksum of all bytes before it.
///
/// ## Errors
///
/// * [`Error::ShortFrame`] if `reply` is shorter than 4 bytes
/// * [`Error::InvalidLength`] if the length field is shorter than
///   [TELEMETRY_LENGTH], or longer than `reply`
/// * [`Error::ChecksumMismatch`] if the checksums differ
pub fn verify_reply_checksum(reply: &[u8]) -> Result {
    if reply.len() < 4 {
        return Err(Error::ShortFrame {
            length: reply.len(),
        });
    }

    let length = usize::from(u16::from_le_bytes([reply[2], reply[3]]));
    if !(TELEMETRY_LENGTH..=reply.len()).contains(&length) {
        debug!(
            "reply length field {length} is invalid for a {} byte reply",
            reply.len()
        );
        return Err(Error::InvalidLength);
    }

    let (body, crc) = reply[..length].split_at(length - CHECKSUM_LENGTH);
    let actual = u16::from_be_bytes([crc[0], crc[1]]);
    let expected = checksum(body);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(())
}

//! # Command frames
//!
//! [CommandFrame] is the basic unit of communication from the controller to
//! the GCU. Every frame is answered with a [Telemetry][crate::Telemetry]
//! reply.
//!
//! ## Frame format
//!
//! All offsets are absolute from the start of the frame. Multi-byte values are
//! little-endian, except for the checksum.
//!
//! Offset  | Size | Field
//! ------- | ---- | -----
//! `0x00`  | 2    | marker, `A8 E5`
//! `0x02`  | 2    | `u16`: total frame length, including the checksum
//! `0x04`  | 1    | protocol version, `02`
//! `0x05`  | 32   | [main block][MainBlock]
//! `0x25`  | 32   | sub block, always zero
//! `0x45`  | 1    | `u8`: opcode
//! `0x46`  | var  | parameters
//! end - 2 | 2    | `u16` (big-endian): [checksum][crate::checksum] over all preceding bytes
use crate::{
    checksum::{Crc16Stream, CHECKSUM_LENGTH},
    Error, Result,
};
use binrw::{binrw, BinRead, BinWrite};
use std::io::Cursor;

/// Marker at the start of every frame sent to the GCU.
pub const COMMAND_MARKER: [u8; 2] = [0xa8, 0xe5];

/// Protocol version sent in every command frame.
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Marker terminating the [angle segment][AngleSetpoint] of the main block.
pub const SEGMENT_END: u8 = 0x04;

const MAIN_BLOCK_LENGTH: usize = 32;
const SUB_BLOCK_LENGTH: usize = 32;

/// Gimbal attitude setpoint, carried in the main block of an
/// [`Opcode::Empty`][crate::Opcode::Empty] frame.
///
/// Values are in hundredths of a degree. Roll is not settable, and is always
/// transmitted as zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AngleSetpoint {
    pub pitch: i16,
    pub yaw: i16,
}

impl AngleSetpoint {
    /// Converts a pitch and yaw in degrees to an [AngleSetpoint], rounding to
    /// the nearest hundredth of a degree.
    ///
    /// ## Errors
    ///
    /// * [`Error::ParameterOutOfRange`] if either angle is not finite, or does
    ///   not fit in an `i16` after scaling.
    pub fn from_degrees(pitch: f64, yaw: f64) -> Result<Self> {
        Ok(Self {
            pitch: centidegrees(pitch)?,
            yaw: centidegrees(yaw)?,
        })
    }

    pub fn pitch_degrees(&self) -> f64 {
        f64::from(self.pitch) / 100.
    }

    pub fn yaw_degrees(&self) -> f64 {
        f64::from(self.yaw) / 100.
    }
}

fn centidegrees(degrees: f64) -> Result<i16> {
    let v = (degrees * 100.).round();
    if !v.is_finite() || v < f64::from(i16::MIN) || v > f64::from(i16::MAX) {
        debug!("angle {degrees} out of range");
        return Err(Error::ParameterOutOfRange);
    }
    Ok(v as i16)
}

/// Angle segment at the start of the main block.
///
/// ## Format
///
/// * `i16`: roll, always 0
/// * `i16`: pitch
/// * `i16`: yaw
/// * `u8`: [SEGMENT_END] when the segment is in use, otherwise 0
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AngleSegment {
    roll: i16,
    pitch: i16,
    yaw: i16,
    end: u8,
}

impl From<Option<AngleSetpoint>> for AngleSegment {
    fn from(v: Option<AngleSetpoint>) -> Self {
        match v {
            Some(a) => Self {
                roll: 0,
                pitch: a.pitch,
                yaw: a.yaw,
                end: SEGMENT_END,
            },
            None => Self::default(),
        }
    }
}

impl AngleSegment {
    fn setpoint(&self) -> Option<AngleSetpoint> {
        (self.end == SEGMENT_END).then_some(AngleSetpoint {
            pitch: self.pitch,
            yaw: self.yaw,
        })
    }
}

/// 32 byte "main" block of a [CommandFrame].
///
/// ## Format
///
/// * 7 bytes: angle segment (see [AngleSetpoint]), zero when unused
/// * 18 bytes: reserved, zero
/// * `bool`: request telemetry
/// * 6 bytes: reserved, zero
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MainBlock {
    #[br(temp)]
    #[bw(calc = AngleSegment::from(self.angles))]
    segment: AngleSegment,

    /// Attitude setpoint. Only meaningful for
    /// [`Opcode::Empty`][crate::Opcode::Empty].
    #[br(calc = segment.setpoint())]
    #[bw(ignore)]
    pub angles: Option<AngleSetpoint>,

    #[br(temp)]
    #[bw(calc = [0; 18])]
    reserved: [u8; 18],

    /// Asks the GCU to fill in the telemetry reply.
    #[br(map = |v: u8| v != 0)]
    #[bw(map = |v: &bool| Into::<u8>::into(*v))]
    pub request_telemetry: bool,

    #[br(temp)]
    #[bw(calc = [0; 6])]
    reserved_tail: [u8; 6],
}

/// A complete frame sent from the controller to the GCU.
///
/// The length and checksum fields are calculated on write. On read, the
/// marker, version, length and checksum are all checked.
///
/// Frames are normally built from a [Command][crate::Command] with
/// [`Command::to_frame()`][crate::Command::to_frame].
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little, stream = s, map_stream = Crc16Stream::new)]
pub struct CommandFrame {
    #[br(temp, assert(marker == COMMAND_MARKER))]
    #[bw(calc = COMMAND_MARKER)]
    marker: [u8; 2],

    #[br(temp, assert(usize::from(length) >= Self::MIN_LENGTH))]
    #[bw(try_calc(u16::try_from(Self::MIN_LENGTH + self.parameters.len())))]
    length: u16,

    #[br(temp, assert(version == PROTOCOL_VERSION))]
    #[bw(calc = PROTOCOL_VERSION)]
    version: u8,

    pub main: MainBlock,

    #[br(temp)]
    #[bw(calc = [0; SUB_BLOCK_LENGTH])]
    sub: [u8; SUB_BLOCK_LENGTH],

    pub opcode: u8,

    /// Opcode-specific parameters, including any normalised region
    /// coordinates.
    #[br(count = usize::from(length) - Self::MIN_LENGTH)]
    pub parameters: Vec<u8>,

    // Checksum of everything read so far, before the checksum field itself
    #[br(temp, calc = s.checksum())]
    #[bw(ignore)]
    calculated: u16,

    #[br(temp, assert(checksum == calculated))]
    #[bw(calc = s.checksum())]
    #[brw(big)]
    checksum: u16,
}

impl CommandFrame {
    /// Length of all fields before the opcode.
    pub const HEADERS_LENGTH: usize = 5 + MAIN_BLOCK_LENGTH + SUB_BLOCK_LENGTH;

    /// Length of a frame with no parameters.
    pub const MIN_LENGTH: usize = Self::HEADERS_LENGTH + 1 + CHECKSUM_LENGTH;

    /// Maximum parameter length which still fits in the length field.
    pub const MAX_PARAMETERS_LENGTH: usize = u16::MAX as usize - Self::MIN_LENGTH;

    pub fn new(main: MainBlock, opcode: u8, parameters: Vec<u8>) -> Result<Self> {
        if parameters.len() > Self::MAX_PARAMETERS_LENGTH {
            debug!("{} bytes of parameters will not fit in a frame", parameters.len());
            return Err(Error::InvalidLength);
        }

        Ok(Self {
            main,
            opcode,
            parameters,
        })
    }

    /// Total length of the frame on the wire, in bytes.
    pub fn frame_length(&self) -> usize {
        Self::MIN_LENGTH + self.parameters.len()
    }

    /// Serialises the frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::with_capacity(self.frame_length()));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Parses a frame, checking its marker, version, length and checksum.
    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(b))?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checksum::checksum;

    /// Empty command with telemetry requested.
    const POLL: &str = concat!(
        "a8e5480002",
        "0000000000000000000000000000000000000000000000000001000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "00",
        "fd13",
    );

    /// Empty command, pitch 12.34, yaw -5.
    const ANGLES: &str = concat!(
        "a8e5480002",
        "0000d2040cfe0400000000000000000000000000000000000001000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "00",
        "e1ea",
    );

    /// OSD off, without telemetry.
    const OSD_OFF: &str = concat!(
        "a8e5490002",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "7300",
        "a841",
    );

    fn poll_main() -> MainBlock {
        MainBlock {
            angles: None,
            request_telemetry: true,
        }
    }

    #[test]
    fn poll() -> Result<()> {
        let expected = hex::decode(POLL)?;
        let frame = CommandFrame::new(poll_main(), 0x00, vec![])?;
        let b = frame.to_bytes()?;
        assert_eq!(expected, b);
        assert_eq!(CommandFrame::MIN_LENGTH, b.len());

        assert_eq!(frame, CommandFrame::from_bytes(&b)?);
        Ok(())
    }

    #[test]
    fn angles() -> Result<()> {
        let expected = hex::decode(ANGLES)?;
        let main = MainBlock {
            angles: Some(AngleSetpoint::from_degrees(12.34, -5.)?),
            request_telemetry: true,
        };
        let frame = CommandFrame::new(main, 0x00, vec![])?;
        let b = frame.to_bytes()?;
        assert_eq!(expected, b);

        assert_eq!(1234i16.to_le_bytes(), b[7..9]);
        assert_eq!((-500i16).to_le_bytes(), b[9..11]);
        assert_eq!(SEGMENT_END, b[11]);
        assert_eq!([0, 0], b[5..7]);

        let parsed = CommandFrame::from_bytes(&b)?;
        assert_eq!(
            Some(AngleSetpoint {
                pitch: 1234,
                yaw: -500
            }),
            parsed.main.angles
        );
        Ok(())
    }

    #[test]
    fn without_telemetry() -> Result<()> {
        let expected = hex::decode(OSD_OFF)?;
        let frame = CommandFrame::new(MainBlock::default(), 0x73, vec![0x00])?;
        let b = frame.to_bytes()?;
        assert_eq!(expected, b);
        assert_eq!(0, b[30]);
        Ok(())
    }

    #[test]
    fn length_and_checksum_fields() -> Result<()> {
        for l in [0, 1, 2, 10, 300] {
            let frame = CommandFrame::new(poll_main(), 0x17, vec![0x5a; l])?;
            let b = frame.to_bytes()?;
            assert_eq!(b.len(), frame.frame_length());
            assert_eq!(usize::from(u16::from_le_bytes([b[2], b[3]])), b.len());
            assert_eq!(0x01, b[30]);
            assert_eq!(0x17, b[69]);

            let (body, crc) = b.split_at(b.len() - CHECKSUM_LENGTH);
            assert_eq!(checksum(body).to_be_bytes(), crc);
        }
        Ok(())
    }

    #[test]
    fn parameters_too_long() {
        let r = CommandFrame::new(
            poll_main(),
            0x00,
            vec![0; CommandFrame::MAX_PARAMETERS_LENGTH + 1],
        );
        assert!(matches!(r, Err(Error::InvalidLength)));
    }

    #[test]
    fn reject_corrupt() -> Result<()> {
        let good = hex::decode(POLL)?;

        // checksum
        let mut b = good.clone();
        b[71] ^= 0xff;
        assert!(CommandFrame::from_bytes(&b).is_err());

        // body
        let mut b = good.clone();
        b[40] = 0x01;
        assert!(CommandFrame::from_bytes(&b).is_err());

        // marker
        let mut b = good.clone();
        b[0] = 0x8a;
        assert!(CommandFrame::from_bytes(&b).is_err());

        // version
        let mut b = good;
        b[4] = 0x03;
        assert!(CommandFrame::from_bytes(&b).is_err());
        Ok(())
    }

    #[test]
    fn angle_range() {
        assert!(AngleSetpoint::from_degrees(327.67, -327.68).is_ok());
        assert!(matches!(
            AngleSetpoint::from_degrees(400., 0.),
            Err(Error::ParameterOutOfRange)
        ));
        assert!(matches!(
            AngleSetpoint::from_degrees(0., f64::NAN),
            Err(Error::ParameterOutOfRange)
        ));

        let a = AngleSetpoint::from_degrees(-0.004, 0.005).unwrap();
        assert_eq!(0, a.pitch);
        assert_eq!(1, a.yaw);
    }
}

//! # Commands
//!
//! A [Command] is an [opcode][Opcode] with its parameter bytes and an
//! optional typed [Payload]. Commands are turned into
//! [command frames][CommandFrame] with [`Command::to_frame()`], which checks
//! that the payload makes sense for the opcode.
//!
//! Commands which take no payload are catalogued in [Action].
//!
//! ## Region commands
//!
//! [`Opcode::Track`] and [`Opcode::PointPan`] take a [Region] of the video
//! frame. Region coordinates are given in pixels, and normalised against the
//! [FrameSize] to the range `0..=10000` before being appended to the
//! parameters as four `u16`s (`x0`, `y0`, `x1`, `y1`).
//!
//! Each region opcode only accepts a fixed set of parameter signatures:
//!
//! Opcode            | Parameters | Meaning
//! ----------------- | ---------- | -------
//! `0x17` (Track)    | `01 01`    | start tracking the region
//! `0x17` (Track)    | `01 00`    | stop tracking
//! `0x1A` (PointPan) | `01`       | pan to centre the region
use crate::{
    frame::{AngleSetpoint, CommandFrame, MainBlock},
    Error, Result,
};
#[cfg(feature = "clap")]
use clap::ValueEnum;
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Normalised coordinate of the bottom or right edge of the video frame.
pub const REGION_SCALE: u16 = 10000;

const TRACK_PARAMETERS: &[&[u8]] = &[&[0x01, 0x01], &[0x01, 0x00]];
const POINT_PAN_PARAMETERS: &[&[u8]] = &[&[0x01]];

/// Known GCU opcodes.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// No action. Used to poll for telemetry, or to move the gimbal with an
    /// [AngleSetpoint].
    Empty = 0x00,
    Calibrate = 0x01,
    /// Return the gimbal to its centre position.
    Recentre = 0x03,
    Lock = 0x11,
    Follow = 0x12,
    /// Point the camera straight down.
    PanDown = 0x13,
    Track = 0x17,
    PointPan = 0x1a,
    Photo = 0x20,
    Video = 0x21,
    ZoomIn = 0x22,
    ZoomOut = 0x23,
    ZoomStop = 0x24,
    Focus = 0x26,
    /// On-screen display.
    Osd = 0x73,
    /// Laser rangefinder.
    Laser = 0x81,
}

impl Opcode {
    /// Parameter signatures which may be followed by a [Region].
    ///
    /// Returns [None] if the opcode does not take a region.
    pub const fn region_parameters(self) -> Option<&'static [&'static [u8]]> {
        match self {
            Self::Track => Some(TRACK_PARAMETERS),
            Self::PointPan => Some(POINT_PAN_PARAMETERS),
            _ => None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(o: Opcode) -> u8 {
        o as u8
    }
}

/// Commands which have no payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Action {
    /// Request telemetry without doing anything.
    Empty,
    Calibrate,
    Recentre,
    Lock,
    Follow,
    PanDown,
    Photo,
    /// Start or stop recording.
    Video,
    /// Start zooming in, until [`Action::ZoomStop`].
    ZoomIn,
    /// Start zooming out, until [`Action::ZoomStop`].
    ZoomOut,
    ZoomStop,
    Focus,
    OsdOn,
    OsdOff,
    LaserOn,
    LaserOff,
}

impl Action {
    pub const fn opcode(self) -> Opcode {
        use Action::*;
        match self {
            Empty => Opcode::Empty,
            Calibrate => Opcode::Calibrate,
            Recentre => Opcode::Recentre,
            Lock => Opcode::Lock,
            Follow => Opcode::Follow,
            PanDown => Opcode::PanDown,
            Photo => Opcode::Photo,
            Video => Opcode::Video,
            ZoomIn => Opcode::ZoomIn,
            ZoomOut => Opcode::ZoomOut,
            ZoomStop => Opcode::ZoomStop,
            Focus => Opcode::Focus,
            OsdOn | OsdOff => Opcode::Osd,
            LaserOn | LaserOff => Opcode::Laser,
        }
    }

    pub const fn parameters(self) -> &'static [u8] {
        use Action::*;
        match self {
            Empty | Calibrate | Recentre | Lock | Follow | PanDown => &[],
            Photo | Video | ZoomIn | ZoomOut | ZoomStop | Focus | OsdOn => &[0x01],
            LaserOn => &[0x02],
            OsdOff | LaserOff => &[0x00],
        }
    }
}

/// Dimensions of the video frame, in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Normalises the corners of `region` to `0..=`[REGION_SCALE].
    ///
    /// Coordinates outside of the frame are clamped to its edge.
    ///
    /// ## Errors
    ///
    /// * [`Error::InvalidFrameSize`] if either dimension is zero
    pub fn normalise(&self, region: &Region) -> Result<[u16; 4]> {
        if self.width == 0 || self.height == 0 {
            debug!("cannot normalise {region:?} against a {self:?} frame");
            return Err(Error::InvalidFrameSize);
        }

        let scale = |v: u32, dimension: u32| {
            let v = (f64::from(v) / f64::from(dimension) * f64::from(REGION_SCALE)).round();
            v.min(f64::from(REGION_SCALE)) as u16
        };

        Ok([
            scale(region.x0, self.width),
            scale(region.y0, self.height),
            scale(region.x1, self.width),
            scale(region.y1, self.height),
        ])
    }
}

/// Rectangular region of the video frame, in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// Left edge
    pub x0: u32,
    /// Top edge
    pub y0: u32,
    /// Right edge
    pub x1: u32,
    /// Bottom edge
    pub y1: u32,
}

impl Region {
    pub const fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

/// Typed data attached to a [Command], in addition to its parameter bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    #[default]
    Plain,
    /// Gimbal attitude, only valid for [`Opcode::Empty`].
    Angles(AngleSetpoint),
    /// Video frame region, only valid for opcodes with
    /// [region parameters][Opcode::region_parameters].
    Region(Region),
}

/// A command to send to the GCU.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    opcode: u8,
    parameters: Vec<u8>,
    request_telemetry: bool,
    payload: Payload,
}

impl Command {
    /// Creates a command with an arbitrary opcode and parameters, which
    /// requests telemetry.
    pub fn new(opcode: impl Into<u8>, parameters: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: opcode.into(),
            parameters: parameters.into(),
            request_telemetry: true,
            payload: Payload::Plain,
        }
    }

    /// Empty command, which only requests telemetry.
    pub fn poll() -> Self {
        Action::Empty.into()
    }

    /// Moves the gimbal to an attitude.
    pub fn angles(setpoint: AngleSetpoint) -> Self {
        Self::poll().with_payload(Payload::Angles(setpoint))
    }

    /// Moves the gimbal to a pitch and yaw, in degrees.
    pub fn angles_degrees(pitch: f64, yaw: f64) -> Result<Self> {
        Ok(Self::angles(AngleSetpoint::from_degrees(pitch, yaw)?))
    }

    /// Starts tracking an object in `region`.
    pub fn track_enter(region: Region) -> Self {
        Self::new(Opcode::Track, [0x01, 0x01]).with_payload(Payload::Region(region))
    }

    /// Stops tracking.
    pub fn track_exit(region: Region) -> Self {
        Self::new(Opcode::Track, [0x01, 0x00]).with_payload(Payload::Region(region))
    }

    /// Pans the camera to centre `region`.
    pub fn point_pan(region: Region) -> Self {
        Self::new(Opcode::PointPan, [0x01]).with_payload(Payload::Region(region))
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_request_telemetry(mut self, request_telemetry: bool) -> Self {
        self.request_telemetry = request_telemetry;
        self
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    pub fn request_telemetry(&self) -> bool {
        self.request_telemetry
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Builds a [CommandFrame] for this command.
    ///
    /// `frame_size` is only used for [region][Payload::Region] commands.
    ///
    /// ## Errors
    ///
    /// * [`Error::MissingRegion`] if the opcode requires a [Region], but the
    ///   payload is not [`Payload::Region`]
    /// * [`Error::UnrecognisedRegionParameters`] if the opcode takes a
    ///   [Region], but not with these parameters
    /// * [`Error::InvalidFrameSize`] if a [Region] is given without a
    ///   non-zero `frame_size`
    /// * [`Error::UnexpectedPayload`] if the payload is not valid for the
    ///   opcode
    /// * [`Error::InvalidLength`] if the parameters do not fit in a frame
    pub fn to_frame(&self, frame_size: Option<FrameSize>) -> Result<CommandFrame> {
        let signatures = Opcode::from_u8(self.opcode).and_then(Opcode::region_parameters);
        let mut main = MainBlock {
            angles: None,
            request_telemetry: self.request_telemetry,
        };
        let mut parameters = self.parameters.clone();

        match (&self.payload, signatures) {
            (Payload::Plain, None) => (),

            (Payload::Plain, Some(_)) => {
                debug!("opcode {:#04x} sent without a region", self.opcode);
                return Err(Error::MissingRegion(self.opcode));
            }

            (Payload::Angles(angles), _) if self.opcode == u8::from(Opcode::Empty) => {
                main.angles = Some(*angles);
            }

            (Payload::Region(region), Some(signatures)) => {
                if !signatures.iter().any(|s| *s == self.parameters.as_slice()) {
                    debug!(
                        "opcode {:#04x} does not take a region with parameters {:02x?}",
                        self.opcode, self.parameters
                    );
                    return Err(Error::UnrecognisedRegionParameters {
                        opcode: self.opcode,
                        parameters: self.parameters.clone(),
                    });
                }

                let coords = frame_size
                    .ok_or(Error::InvalidFrameSize)?
                    .normalise(region)?;
                trace!("normalised {region:?} to {coords:?}");
                for c in coords {
                    parameters.extend_from_slice(&c.to_le_bytes());
                }
            }

            (payload, _) => {
                debug!("opcode {:#04x} cannot take {payload:?}", self.opcode);
                return Err(Error::UnexpectedPayload(self.opcode));
            }
        }

        CommandFrame::new(main, self.opcode, parameters)
    }
}

impl From<Action> for Command {
    fn from(a: Action) -> Self {
        Self::new(a.opcode(), a.parameters())
    }
}

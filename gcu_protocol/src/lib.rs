#![doc = include_str!("../README.md")]

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate tracing;

pub mod checksum;
mod command;
mod error;
mod frame;
mod telemetry;

pub use crate::{
    checksum::{checksum, Crc16Digest, Crc16Stream},
    command::{Action, Command, FrameSize, Opcode, Payload, Region, REGION_SCALE},
    error::Error,
    frame::{AngleSetpoint, CommandFrame, MainBlock, COMMAND_MARKER, PROTOCOL_VERSION, SEGMENT_END},
    telemetry::{verify_reply_checksum, Telemetry, REPLY_MARKER, TELEMETRY_LENGTH},
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;

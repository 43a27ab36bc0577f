#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

mod config;
mod controller;
mod error;
mod tcp;

pub use {
    crate::{
        config::{SessionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REPLY_TIMEOUT},
        controller::GcuController,
        error::Error,
        tcp::GcuTcpChannel,
    },
    gcu_protocol as protocol,
};
pub type Result<T = ()> = std::result::Result<T, Error>;

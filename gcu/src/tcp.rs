//! Stream transport for the GCU protocol.
//!
//! GCUs listen for a single TCP connection, typically on port 9999. Each
//! [command frame][CommandFrame] is answered by exactly one reply, which is
//! framed on the stream by its own length field.
use crate::{
    protocol::{CommandFrame, Error as ProtocolError, REPLY_MARKER, TELEMETRY_LENGTH},
    Error, Result,
};
use std::{
    io::{Error as IoError, ErrorKind},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
    time::timeout,
};

/// Length of the marker and length fields at the start of every reply.
const REPLY_HEADER_LENGTH: usize = 4;

pub struct GcuTcpChannel<S = TcpStream> {
    stream: S,
}

impl GcuTcpChannel<TcpStream> {
    /// Connects to a GCU over TCP.
    ///
    /// ## Errors
    ///
    /// * [`Error::Connection`] if the connection is refused, the address is
    ///   unreachable, or `connect_timeout` elapses
    pub async fn connect<A: ToSocketAddrs>(addr: A, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                Error::Connection(IoError::new(
                    ErrorKind::TimedOut,
                    "timeout connecting to GCU",
                ))
            })?
            .map_err(Error::Connection)?;

        stream.set_nodelay(true).map_err(Error::Connection)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("connected to GCU at {peer}");
        }
        Ok(Self { stream })
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> GcuTcpChannel<S> {
    /// Wraps an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Encodes and sends a frame.
    ///
    /// Nothing is written if the frame cannot be encoded.
    pub async fn send(&mut self, frame: &CommandFrame) -> Result {
        let out = frame.to_bytes()?;
        trace!(">>> {}", hex::encode(&out));
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads one reply from the stream, without decoding it.
    ///
    /// Every reply is at least [TELEMETRY_LENGTH] bytes. A reply with a bad
    /// marker or a length field shorter than that is read up to
    /// [TELEMETRY_LENGTH] bytes and discarded, so the next read starts at the
    /// next reply.
    ///
    /// ## Errors
    ///
    /// * [`Error::Protocol`] with
    ///   [`BadHeader`][crate::protocol::Error::BadHeader] if the reply does not
    ///   start with [REPLY_MARKER]
    /// * [`Error::Protocol`] with
    ///   [`ShortFrame`][crate::protocol::Error::ShortFrame] if the reply's
    ///   length field is shorter than [TELEMETRY_LENGTH]
    /// * [`Error::Io`] if the stream fails or closes before the whole reply
    ///   was read.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let mut b = Vec::with_capacity(TELEMETRY_LENGTH);
        self.fill(&mut b, REPLY_HEADER_LENGTH).await?;

        let marker = [b[0], b[1]];
        let length = usize::from(u16::from_le_bytes([b[2], b[3]]));
        let rejected = if marker != REPLY_MARKER {
            Some(ProtocolError::BadHeader(marker))
        } else if length < TELEMETRY_LENGTH {
            Some(ProtocolError::ShortFrame { length })
        } else {
            None
        };

        if let Some(e) = rejected {
            self.fill(&mut b, TELEMETRY_LENGTH).await?;
            trace!("<<< {} (discarded)", hex::encode(&b));
            return Err(e.into());
        }

        self.fill(&mut b, length).await?;
        trace!("<<< {}", hex::encode(&b));
        Ok(b)
    }

    /// Reads from the stream until `b` is `length` bytes long.
    async fn fill(&mut self, b: &mut Vec<u8>, length: usize) -> Result {
        let start = b.len();
        b.resize(length, 0);
        self.stream.read_exact(&mut b[start..]).await?;
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result {
        Ok(self.stream.shutdown().await?)
    }

    /// Extracts the inner stream from this channel.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

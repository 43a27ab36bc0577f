use crate::{
    config::SessionConfig,
    error::Error,
    protocol::{
        verify_reply_checksum, Action, AngleSetpoint, Command, CommandFrame, Region, Telemetry,
    },
    tcp::GcuTcpChannel,
    Result,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
    sync::Mutex,
    time::timeout,
};

/// [GcuController] holds a session with a single GCU.
///
/// ## General design
///
/// The GCU answers every command with exactly one telemetry reply, and
/// replies carry nothing which identifies the command they answer. The
/// session's stream is held behind a single lock for the whole exchange
/// (encode, write, read the reply, decode), so concurrent callers take turns
/// and each gets the reply to its own command.
///
/// ## Failures
///
/// * Stream errors ([`Error::Io`]) close the session; later commands fail
///   with [`Error::Disconnected`] until it is [reconnected][Self::connect].
/// * Undecodable replies fail only the command that caused them. Replies
///   with a bad marker or length are read to their full length and
///   discarded, so the next command gets its own reply.
/// * Timeouts also fail only their command, but the session is _not_
///   re-synchronised: a late reply may be read as the reply to the next
///   command.
pub struct GcuController<S = TcpStream> {
    config: SessionConfig,
    channel: Mutex<Option<GcuTcpChannel<S>>>,
}

impl GcuController<TcpStream> {
    /// Connects to a GCU over TCP.
    ///
    /// ## Args
    ///
    /// * `addr`: The TCP socket address of the GCU
    /// * `config`: Session options
    pub async fn connect_tcp<A: ToSocketAddrs>(addr: A, config: SessionConfig) -> Result<Self> {
        let c = Self::new(config);
        c.connect(addr).await?;
        Ok(c)
    }

    /// Opens a new TCP connection for this session, replacing any existing
    /// connection.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result {
        let channel = GcuTcpChannel::connect(addr, self.config.connect_timeout)
            .await
            .map_err(|e| {
                error!("cannot connect to GCU: {e}");
                e
            })?;

        let mut lock = self.channel.lock().await;
        if lock.replace(channel).is_some() {
            debug!("replaced existing connection");
        }
        Ok(())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> GcuController<S> {
    /// Creates a disconnected session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            channel: Mutex::new(None),
        }
    }

    /// Uses an already-connected stream for this session, replacing any
    /// existing connection.
    pub async fn attach(&self, stream: S) {
        let mut lock = self.channel.lock().await;
        if lock.replace(GcuTcpChannel::new(stream)).is_some() {
            debug!("replaced existing connection");
        }
        info!("attached to GCU stream");
    }

    /// Closes the session's stream.
    ///
    /// Does nothing if the session is already disconnected.
    pub async fn disconnect(&self) {
        let Some(mut channel) = self.channel.lock().await.take() else {
            return;
        };

        if let Err(e) = channel.shutdown().await {
            debug!("error shutting down stream: {e}");
        }
        info!("disconnected from GCU");
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sends a command to the GCU, and waits for its reply.
    ///
    /// ## Errors
    ///
    /// * [`Error::Disconnected`] if there is no open session
    /// * [`Error::Protocol`] if the command could not be encoded (nothing is
    ///   sent), or the reply could not be decoded
    /// * [`Error::ReadTimeout`] if there was no complete reply within
    ///   [`SessionConfig::reply_timeout`]
    /// * [`Error::Io`] if the stream failed. This closes the session.
    pub async fn execute(&self, command: &Command) -> Result<Telemetry> {
        let mut lock = self.channel.lock().await;
        let channel = lock.as_mut().ok_or(Error::Disconnected)?;

        let frame = command.to_frame(self.config.frame_size)?;
        debug!(
            "sending opcode {:#04x}, {} bytes",
            frame.opcode,
            frame.frame_length()
        );

        match self.exchange(channel, &frame).await {
            Err(e) if e.is_session_fatal() => {
                error!("GCU stream failed, closing session: {e}");
                *lock = None;
                Err(e)
            }
            r => r,
        }
    }

    async fn exchange(
        &self,
        channel: &mut GcuTcpChannel<S>,
        frame: &CommandFrame,
    ) -> Result<Telemetry> {
        channel.send(frame).await?;

        let Ok(reply) = timeout(self.config.reply_timeout, channel.recv()).await else {
            warn!(
                "no reply to opcode {:#04x} within {:?}",
                frame.opcode, self.config.reply_timeout
            );
            return Err(Error::ReadTimeout);
        };
        let reply = reply.map_err(|e| {
            if e.is_decode_error() {
                warn!("bad reply to opcode {:#04x}: {e}", frame.opcode);
            }
            e
        })?;

        if self.config.verify_reply_checksum {
            verify_reply_checksum(&reply).map_err(|e| {
                warn!("bad reply to opcode {:#04x}: {e}", frame.opcode);
                e
            })?;
        }

        let telemetry = Telemetry::decode(&reply).map_err(|e| {
            warn!("cannot decode reply to opcode {:#04x}: {e}", frame.opcode);
            e
        })?;
        debug!("telemetry: {telemetry}");
        Ok(telemetry)
    }

    /// Requests telemetry, without doing anything else.
    pub async fn poll(&self) -> Result<Telemetry> {
        self.execute(&Command::poll()).await
    }

    pub async fn perform(&self, action: Action) -> Result<Telemetry> {
        self.execute(&action.into()).await
    }

    /// Moves the gimbal to a pitch and yaw, in degrees.
    pub async fn set_angles(&self, pitch: f64, yaw: f64) -> Result<Telemetry> {
        let setpoint = AngleSetpoint::from_degrees(pitch, yaw)?;
        self.execute(&Command::angles(setpoint)).await
    }

    /// Starts tracking an object in `region` of the video frame.
    pub async fn track_enter(&self, region: Region) -> Result<Telemetry> {
        self.execute(&Command::track_enter(region)).await
    }

    pub async fn track_exit(&self, region: Region) -> Result<Telemetry> {
        self.execute(&Command::track_exit(region)).await
    }

    /// Pans the camera to centre `region` of the video frame.
    pub async fn point_pan(&self, region: Region) -> Result<Telemetry> {
        self.execute(&Command::point_pan(region)).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{Error as ProtocolError, FrameSize, Opcode};
    use std::{sync::Arc, time::Duration};
    use tokio::{
        io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
        net::TcpListener,
    };

    /// Reads one command frame from the device end of a stream.
    async fn read_frame<T: AsyncRead + Unpin>(device: &mut T) -> Result<CommandFrame> {
        let mut b = vec![0; 4];
        device.read_exact(&mut b).await?;
        let length = usize::from(u16::from_le_bytes([b[2], b[3]]));
        b.resize(length, 0);
        device.read_exact(&mut b[4..]).await?;
        Ok(CommandFrame::from_bytes(&b)?)
    }

    /// Reply which reports `zoom`, so callers can tell replies apart.
    fn reply(zoom: u16) -> Result<Vec<u8>> {
        Ok(Telemetry {
            roll: 1234,
            target_distance: 100,
            zoom,
            ..Default::default()
        }
        .to_bytes()?)
    }

    async fn attached(config: SessionConfig) -> (GcuController<DuplexStream>, DuplexStream) {
        let (client, device) = duplex(4096);
        let gcu = GcuController::new(config);
        gcu.attach(client).await;
        (gcu, device)
    }

    #[tokio::test]
    async fn poll() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;
        assert!(gcu.is_connected().await);

        let dev = tokio::spawn(async move {
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(35)?).await?;
            Ok::<_, Error>(frame)
        });

        let t = gcu.poll().await?;
        assert!((t.roll_degrees() - 12.34).abs() < 1e-9);
        assert!((t.target_distance_metres() - 10.).abs() < 1e-9);
        assert_eq!(35, t.zoom);

        let frame = dev.await.expect("device task")?;
        assert_eq!(0x00, frame.opcode);
        assert!(frame.parameters.is_empty());
        assert!(frame.main.request_telemetry);
        Ok(())
    }

    #[tokio::test]
    async fn set_angles() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;

        let dev = tokio::spawn(async move {
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(10)?).await?;
            Ok::<_, Error>(frame)
        });

        gcu.set_angles(12.34, -5.).await?;
        let frame = dev.await.expect("device task")?;
        assert_eq!(
            Some(AngleSetpoint {
                pitch: 1234,
                yaw: -500
            }),
            frame.main.angles
        );
        Ok(())
    }

    #[tokio::test]
    async fn disconnected() -> Result<()> {
        let gcu: GcuController<DuplexStream> = GcuController::new(SessionConfig::default());
        assert!(!gcu.is_connected().await);
        assert!(matches!(gcu.poll().await, Err(Error::Disconnected)));

        // no-op
        gcu.disconnect().await;

        let (gcu, _device) = attached(SessionConfig::default()).await;
        gcu.disconnect().await;
        assert!(!gcu.is_connected().await);
        assert!(matches!(gcu.poll().await, Err(Error::Disconnected)));
        gcu.disconnect().await;
        Ok(())
    }

    #[tokio::test]
    async fn region_rejected_before_write() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;

        let r = gcu.point_pan(Region::new(0, 0, 1920, 1080)).await;
        assert!(matches!(
            r,
            Err(Error::Protocol(ProtocolError::InvalidFrameSize))
        ));
        assert!(gcu.is_connected().await);

        // The next frame on the wire is the poll.
        let dev = tokio::spawn(async move {
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(10)?).await?;
            Ok::<_, Error>(frame)
        });
        gcu.poll().await?;
        let frame = dev.await.expect("device task")?;
        assert_eq!(0x00, frame.opcode);
        Ok(())
    }

    #[tokio::test]
    async fn point_pan() -> Result<()> {
        let config = SessionConfig::default().with_frame_size(FrameSize::new(1920, 1080));
        let (gcu, mut device) = attached(config).await;

        let dev = tokio::spawn(async move {
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(10)?).await?;
            Ok::<_, Error>(frame)
        });
        gcu.point_pan(Region::new(0, 0, 1920, 1080)).await?;

        let frame = dev.await.expect("device task")?;
        assert_eq!(u8::from(Opcode::PointPan), frame.opcode);
        assert_eq!(
            vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x10, 0x27, 0x10, 0x27],
            frame.parameters
        );
        assert_eq!(81, frame.frame_length());
        Ok(())
    }

    #[tokio::test]
    async fn one_exchange_at_a_time() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;
        let gcu = Arc::new(gcu);

        let dev = tokio::spawn(async move {
            for _ in 0..2 {
                let frame = read_frame(&mut device).await?;

                // Nothing else may be written until this frame is answered.
                let mut b = [0; 1];
                let r = timeout(Duration::from_millis(100), device.read(&mut b)).await;
                assert!(r.is_err(), "second frame sent before reply");

                device.write_all(&reply(frame.opcode.into())?).await?;
            }
            Ok::<_, Error>(())
        });

        let a = {
            let gcu = gcu.clone();
            tokio::spawn(async move { gcu.perform(Action::Photo).await })
        };
        let b = {
            let gcu = gcu.clone();
            tokio::spawn(async move { gcu.perform(Action::ZoomIn).await })
        };

        let a = a.await.expect("caller task")?;
        let b = b.await.expect("caller task")?;
        dev.await.expect("device task")?;

        assert_eq!(0x20, a.zoom);
        assert_eq!(0x22, b.zoom);
        Ok(())
    }

    #[tokio::test]
    async fn reply_timeout() -> Result<()> {
        let config = SessionConfig::default().with_reply_timeout(Duration::from_millis(50));
        let (gcu, mut device) = attached(config).await;

        let dev = tokio::spawn(async move {
            // Ignore the first frame, and answer the second.
            read_frame(&mut device).await?;
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(20)?).await?;
            Ok::<_, Error>(frame)
        });

        assert!(matches!(gcu.poll().await, Err(Error::ReadTimeout)));
        assert!(gcu.is_connected().await);

        let t = gcu.perform(Action::ZoomStop).await?;
        assert_eq!(20, t.zoom);
        let frame = dev.await.expect("device task")?;
        assert_eq!(0x24, frame.opcode);
        Ok(())
    }

    #[tokio::test]
    async fn decode_errors_keep_session() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;

        let dev = tokio::spawn(async move {
            let mut bad_header = reply(10)?;
            bad_header[0] = 0xa8;
            bad_header[1] = 0xe5;
            read_frame(&mut device).await?;
            device.write_all(&bad_header).await?;

            let mut short = reply(10)?;
            short[2] = 0x0a;
            read_frame(&mut device).await?;
            device.write_all(&short).await?;

            read_frame(&mut device).await?;
            device.write_all(&reply(30)?).await?;
            Ok::<_, Error>(())
        });

        let e = gcu.poll().await.expect_err("bad header");
        assert!(matches!(
            e,
            Error::Protocol(ProtocolError::BadHeader([0xa8, 0xe5]))
        ));
        assert!(e.is_decode_error());
        assert!(!e.is_session_fatal());

        let e = gcu.poll().await.expect_err("short frame");
        assert!(matches!(
            e,
            Error::Protocol(ProtocolError::ShortFrame { length: 10 })
        ));
        assert!(gcu.is_connected().await);

        assert_eq!(30, gcu.poll().await?.zoom);
        dev.await.expect("device task")?;
        Ok(())
    }

    #[tokio::test]
    async fn replies_stay_paired_after_bad_header() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;

        let dev = tokio::spawn(async move {
            let mut bad = reply(0)?;
            bad[0] = 0x00;
            read_frame(&mut device).await?;
            device.write_all(&bad).await?;

            for zoom in 1..=5 {
                read_frame(&mut device).await?;
                device.write_all(&reply(zoom)?).await?;
            }
            Ok::<_, Error>(())
        });

        assert!(matches!(
            gcu.poll().await,
            Err(Error::Protocol(ProtocolError::BadHeader([0x00, 0x5e])))
        ));
        for zoom in 1..=5 {
            assert_eq!(zoom, gcu.poll().await?.zoom);
        }
        dev.await.expect("device task")?;
        Ok(())
    }

    #[tokio::test]
    async fn reply_checksum() -> Result<()> {
        let mut bad = reply(35)?;
        bad[59] = 0x24;

        // ignored by default
        let (gcu, mut device) = attached(SessionConfig::default()).await;
        let b = bad.clone();
        let dev = tokio::spawn(async move {
            read_frame(&mut device).await?;
            device.write_all(&b).await?;
            Ok::<_, Error>(())
        });
        assert_eq!(36, gcu.poll().await?.zoom);
        dev.await.expect("device task")?;

        let config = SessionConfig::default().with_verify_reply_checksum(true);
        let (gcu, mut device) = attached(config).await;
        let dev = tokio::spawn(async move {
            read_frame(&mut device).await?;
            device.write_all(&bad).await?;
            read_frame(&mut device).await?;
            device.write_all(&reply(35)?).await?;
            Ok::<_, Error>(())
        });
        let e = gcu.poll().await.expect_err("checksum mismatch");
        assert!(matches!(
            e,
            Error::Protocol(ProtocolError::ChecksumMismatch { .. })
        ));
        assert!(e.is_decode_error());
        assert_eq!(35, gcu.poll().await?.zoom);
        dev.await.expect("device task")?;
        Ok(())
    }

    #[tokio::test]
    async fn stream_failure_closes_session() -> Result<()> {
        let (gcu, mut device) = attached(SessionConfig::default()).await;

        let dev = tokio::spawn(async move {
            read_frame(&mut device).await?;
            // half a reply, then hang up
            device.write_all(&reply(10)?[..20]).await?;
            Ok::<_, Error>(())
        });

        let e = gcu.poll().await.expect_err("stream closed");
        assert!(matches!(e, Error::Io(_)));
        assert!(e.is_session_fatal());
        dev.await.expect("device task")?;

        assert!(!gcu.is_connected().await);
        assert!(matches!(gcu.poll().await, Err(Error::Disconnected)));
        Ok(())
    }

    #[tokio::test]
    async fn tcp() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let dev = tokio::spawn(async move {
            let (mut device, _) = listener.accept().await?;
            let frame = read_frame(&mut device).await?;
            device.write_all(&reply(45)?).await?;
            Ok::<_, Error>(frame)
        });

        let gcu = GcuController::connect_tcp(addr, SessionConfig::default()).await?;
        assert!(gcu.is_connected().await);
        assert_eq!(45, gcu.perform(Action::LaserOn).await?.zoom);
        gcu.disconnect().await;
        assert!(!gcu.is_connected().await);

        let frame = dev.await.expect("device task")?;
        assert_eq!(0x81, frame.opcode);
        assert_eq!(vec![0x02], frame.parameters);
        Ok(())
    }

    #[tokio::test]
    async fn connection_refused() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let config = SessionConfig::default().with_connect_timeout(Duration::from_secs(1));
        let e = GcuController::connect_tcp(addr, config)
            .await
            .err()
            .expect("connection refused");
        assert!(matches!(e, Error::Connection(_)));
        assert!(e.is_session_fatal());
        Ok(())
    }
}

use clap::{Parser, Subcommand};
use gcu::{
    protocol::{Action, FrameSize, Region},
    GcuController, Result, SessionConfig,
};
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// GCU command line control.
///
/// Sends a single command to the GCU, and prints its telemetry reply.
///
/// Region commands take pixel coordinates in the camera's video frame, which
/// is set with `--width` and `--height`.
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// Address of the GCU.
    #[clap(short, long, default_value = "192.168.168.111:9999")]
    pub address: String,

    /// Video frame width, in pixels.
    #[clap(long, default_value_t = 1920)]
    pub width: u32,

    /// Video frame height, in pixels.
    #[clap(long, default_value_t = 1080)]
    pub height: u32,

    /// Time to wait for a connection, in milliseconds.
    #[clap(long, default_value_t = 5000)]
    pub connect_timeout: u64,

    /// Time to wait for the reply, in milliseconds.
    #[clap(long, default_value_t = 5000)]
    pub reply_timeout: u64,

    #[clap(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Performs an action which takes no arguments.
    Action {
        #[clap(value_enum)]
        action: Action,
    },

    /// Moves the gimbal to a pitch and yaw, in degrees.
    Angles {
        #[clap(allow_hyphen_values = true)]
        pitch: f64,
        #[clap(allow_hyphen_values = true)]
        yaw: f64,
    },

    /// Starts tracking an object in a region.
    TrackEnter(RegionArgs),

    /// Stops tracking.
    TrackExit(RegionArgs),

    /// Pans the camera to centre a region.
    PointPan(RegionArgs),
}

#[derive(Debug, clap::Args)]
struct RegionArgs {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl From<RegionArgs> for Region {
    fn from(r: RegionArgs) -> Self {
        Region::new(r.x0, r.y0, r.x1, r.y1)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .compact()
        .init();
    let opts = CliParser::parse();
    let config = SessionConfig::default()
        .with_connect_timeout(Duration::from_millis(opts.connect_timeout))
        .with_reply_timeout(Duration::from_millis(opts.reply_timeout))
        .with_frame_size(FrameSize::new(opts.width, opts.height));
    let gcu = GcuController::connect_tcp(&opts.address, config).await?;

    let telemetry = match opts.command {
        CliCommand::Action { action } => gcu.perform(action).await,
        CliCommand::Angles { pitch, yaw } => gcu.set_angles(pitch, yaw).await,
        CliCommand::TrackEnter(r) => gcu.track_enter(r.into()).await,
        CliCommand::TrackExit(r) => gcu.track_exit(r.into()).await,
        CliCommand::PointPan(r) => gcu.point_pan(r.into()).await,
    };
    gcu.disconnect().await;

    info!("{}", telemetry?);
    Ok(())
}

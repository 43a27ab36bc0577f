use clap::Parser;
use gcu::{GcuController, Result, SessionConfig};
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

/// GCU telemetry watcher.
///
/// Polls the GCU for telemetry at a fixed interval, and logs every reply.
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// Address of the GCU.
    #[clap(short, long, default_value = "192.168.168.111:9999")]
    pub address: String,

    /// Polling interval, in milliseconds.
    #[clap(short, long, default_value_t = 500)]
    pub interval: u64,

    /// Time to wait for each reply, in milliseconds.
    #[clap(long, default_value_t = 5000)]
    pub reply_timeout: u64,

    /// Check the checksum of every reply.
    #[clap(long)]
    pub verify_checksum: bool,
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
        .with_reply_timeout(Duration::from_millis(opts.reply_timeout))
        .with_verify_reply_checksum(opts.verify_checksum);
    let gcu = GcuController::connect_tcp(&opts.address, config).await?;

    let mut ticker = interval(Duration::from_millis(opts.interval));
    loop {
        ticker.tick().await;
        match gcu.poll().await {
            Ok(t) => info!("{t}"),
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => warn!("poll failed: {e}"),
        }
    }
}

//! Simulates a session between two local parties.
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lovepair::{
    channel::ChannelOpts,
    data_types::Choice,
    protocol::{SessionOpts, simulate},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Runs the host (sender) and joiner (chooser) roles against each other in one process.
///
/// Logging can be controlled with an EnvFilter via the `LOVEPAIR_LOG` environment variable.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The choice of the host: `love` or `friendship`.
    #[arg(long)]
    host: Choice,
    /// The choice of the joiner: `love` or `friendship`.
    #[arg(long)]
    joiner: Choice,
    /// Seconds to wait for a message from the other party.
    #[arg(long, default_value_t = ChannelOpts::default().recv_timeout.as_secs())]
    recv_timeout: u64,
    /// Number of undecodable messages dropped before a session fails.
    #[arg(long, default_value_t = SessionOpts::default().max_malformed_msgs)]
    max_malformed_msgs: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    let cli = Cli::parse();
    let channel_opts = ChannelOpts {
        recv_timeout: Duration::from_secs(cli.recv_timeout),
        ..Default::default()
    };
    let opts = SessionOpts {
        max_malformed_msgs: cli.max_malformed_msgs,
    };
    let (host, joiner) = simulate(cli.host, cli.joiner, channel_opts, opts)
        .await
        .context("protocol session")?;
    info!(%host, %joiner, "session resolved");
    println!("host sees: {host}");
    println!("joiner sees: {joiner}");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var("LOVEPAIR_LOG")
        .with_default_directive("lovepair=info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    Ok(())
}

// chatmesh: terminal client for the peer-to-peer chat overlay.

mod config;
mod console;

use anyhow::Context;
use chatmesh_core::{ClientConfig, Session};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal client for the chatmesh peer-to-peer chat overlay")]
struct Args {
    /// Tracker account name
    #[arg(long, env = "CHATMESH_USERNAME")]
    username: String,
    /// Tracker account password
    #[arg(long, env = "CHATMESH_PASSWORD", hide_env_values = true)]
    password: String,
    /// Address of this user's peer node as others should reach it
    #[arg(long)]
    ip: String,
    /// Port of this user's peer node
    #[arg(long)]
    port: u16,
    /// Channel to join after registering
    #[arg(long)]
    channel: Option<String>,
    /// Tracker base URL (overrides config file and CHATMESH_TRACKER_URL)
    #[arg(long)]
    tracker: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut cfg = config::load();
    if let Some(url) = args.tracker.clone() {
        cfg.tracker_url = url;
    }
    let client = cfg.into_client_config();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args, client))
}

async fn run(args: Args, client: ClientConfig) -> anyhow::Result<()> {
    let (session, events) = Session::connect(client).context("building HTTP clients")?;
    info!(
        tracker = %session.config().tracker_url,
        poll_ms = session.config().poll_interval.as_millis() as u64,
        "starting"
    );

    session
        .login(&args.username, &args.password)
        .await
        .context("login failed")?;
    let address = session
        .register_peer(&args.ip, args.port)
        .await
        .context("peer registration failed")?;
    println!("logged in as {} at {address}", args.username);

    if let Some(channel) = &args.channel {
        let outcome = session
            .join_channel(channel)
            .await
            .with_context(|| format!("could not join #{channel}"))?;
        println!("joined #{channel} ({} members)", outcome.roster.member_count);
        if let Err(e) = session.select_channel(channel).await {
            warn!(%channel, error = %e, "could not focus channel");
        }
    }

    let result = console::run(&session, events, shutdown_signal()).await;
    session.stop_polling().await;
    info!("stopped");
    result
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

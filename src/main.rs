#![forbid(unsafe_code)]

//! `discord-relay`: batching relay from a Discord channel to a webhook.
//!
//! Bootstraps configuration, starts the batch dispatcher, the Discord
//! gateway client and intake, then waits for a termination signal and
//! drains the pending queue before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use discord_relay::config::GlobalConfig;
use discord_relay::discord::directory::ChannelDirectory;
use discord_relay::discord::gateway::{GatewayClient, GatewayConfig};
use discord_relay::discord::protocol::RELAY_INTENTS;
use discord_relay::relay::dispatcher::{Dispatcher, RetryPolicy};
use discord_relay::relay::intake::Intake;
use discord_relay::relay::lifecycle::Lifecycle;
use discord_relay::relay::queue::PendingQueue;
use discord_relay::sink::webhook::WebhookSink;
use discord_relay::status::{serve_status, StatusState};
use discord_relay::{AppError, Result};

/// Gateway → intake buffer. Intake never suspends, so this rarely fills.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "discord-relay", about = "Batching Discord to webhook relay", version, long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(args.log_format)?;
    info!("discord-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load(args.config.as_deref()).await?;
    info!("configuration loaded");

    // ── Relay core ──────────────────────────────────────
    let queue = Arc::new(PendingQueue::new());
    let lifecycle = Arc::new(Lifecycle::new(config.shutdown.intake));
    let sink = Arc::new(WebhookSink::new(
        &config.webhook.url,
        config.webhook.timeout(),
    )?);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        sink,
        RetryPolicy::from(&config.dispatch),
    ));

    let ct = CancellationToken::new();
    let dispatch_handle = Arc::clone(&dispatcher).spawn(config.dispatch.interval(), ct.clone());
    info!(
        interval_ms = config.dispatch.interval_ms,
        max_attempts = config.dispatch.max_attempts,
        "dispatcher started"
    );

    // ── Event source ────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let intake_handle = Intake::new(
        config.discord.channel_id.clone(),
        Arc::clone(&queue),
        Arc::clone(&lifecycle),
    )
    .spawn(event_rx);

    let gateway = GatewayClient::new(
        GatewayConfig {
            url: config.discord.gateway_url.clone(),
            token: config.discord.bot_token.clone(),
            intents: RELAY_INTENTS,
        },
        Arc::new(ChannelDirectory::new()),
        event_tx,
    );
    // The event source stops before the final drain check, ahead of the
    // dispatcher and status server.
    let source_ct = ct.child_token();
    let mut gateway_handle = gateway.spawn(source_ct.clone());

    // ── Status endpoint ─────────────────────────────────
    let status_handle = config.status.port.map(|port| {
        let state = StatusState {
            queue: Arc::clone(&queue),
            lifecycle: Arc::clone(&lifecycle),
            dispatcher: Arc::clone(&dispatcher),
        };
        let status_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_status(state, port, status_ct).await {
                error!(%err, "status server failed");
            }
        })
    });

    info!(channel = %config.discord.channel_id, "relay running");

    // ── Wait for shutdown ───────────────────────────────
    let signal_handle = tokio::spawn(watch_signals(Arc::clone(&lifecycle)));

    let mut gateway_result = None;
    tokio::select! {
        () = lifecycle.shutdown_requested() => {}
        joined = &mut gateway_handle => {
            gateway_result = Some(flatten(joined));
            lifecycle.request_shutdown();
        }
    }

    // ── Drain, then tear down ───────────────────────────
    lifecycle
        .drain(&queue, config.shutdown.poll_interval())
        .await;

    source_ct.cancel();
    let gateway_result = match gateway_result {
        Some(result) => result,
        None => flatten(gateway_handle.await),
    };
    // The gateway owned the only event sender, so intake ends once it has
    // handled whatever was still buffered.
    let _ = intake_handle.await;
    lifecycle
        .drain(&queue, config.shutdown.poll_interval())
        .await;

    ct.cancel();
    signal_handle.abort();
    let _ = dispatch_handle.await;
    if let Some(handle) = status_handle {
        let _ = handle.await;
    }
    info!("discord-relay shut down");

    gateway_result
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|err| AppError::Gateway(format!("gateway task failed: {err}")))?
}

/// Forward every SIGINT / SIGTERM to the lifecycle controller. Only the
/// first one starts the drain; the rest are ignored.
async fn watch_signals(lifecycle: Arc<Lifecycle>) {
    loop {
        shutdown_signal().await;
        lifecycle.request_shutdown();
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

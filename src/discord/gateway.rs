//! Minimal Discord gateway client.
//!
//! Connects over websocket, identifies with the bot token, keeps the
//! heartbeat going and turns `MESSAGE_CREATE` dispatches into
//! [`MessageEvent`]s on an mpsc channel. Channel and guild dispatches keep
//! the [`ChannelDirectory`] current. Dropped connections are re-established
//! with exponential backoff; close codes that cannot succeed on retry end
//! the client with an error.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::directory::{ChannelDirectory, RawChannel, RawGuild, RawGuildDelete};
use super::protocol::{self, opcode, GatewayFrame, Hello, Ready};
use crate::models::message::{MessageEvent, RawMessage};
use crate::{AppError, Result};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Websocket URL, including `v` and `encoding` query parameters.
    pub url: String,
    /// Bot token.
    pub token: String,
    /// Intent bitfield sent with identify.
    pub intents: u64,
}

/// How one websocket session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown requested.
    Cancelled,
    /// Connection lost or server asked to reconnect.
    Reconnect {
        reason: String,
        /// Whether `READY` was received during this session.
        established: bool,
    },
    /// Retrying cannot help (bad token, bad intents).
    Fatal(String),
}

/// Gateway client producing message events for intake.
pub struct GatewayClient {
    config: GatewayConfig,
    directory: Arc<ChannelDirectory>,
    events: mpsc::Sender<MessageEvent>,
}

impl GatewayClient {
    /// Construct a client (does not connect yet).
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        directory: Arc<ChannelDirectory>,
        events: mpsc::Sender<MessageEvent>,
    ) -> Self {
        Self {
            config,
            directory,
            events,
        }
    }

    /// Run the connect/reconnect loop in the background.
    ///
    /// The task ends with `Ok(())` when `cancel` fires and with
    /// `AppError::Gateway` when Discord closes the connection with a
    /// non-recoverable code.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel).instrument(info_span!("gateway")))
    }

    async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut delay = INITIAL_RECONNECT_DELAY;

        loop {
            match self.session(&cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    info!("gateway client stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Fatal(reason)) => {
                    error!(reason, "gateway rejected the connection");
                    return Err(AppError::Gateway(reason));
                }
                Ok(SessionEnd::Reconnect {
                    reason,
                    established,
                }) => {
                    if established {
                        delay = INITIAL_RECONNECT_DELAY;
                    }
                    warn!(reason, delay = ?delay, "gateway connection lost; reconnecting");
                }
                Err(err) => {
                    warn!(%err, delay = ?delay, "gateway connection failed; retrying");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("gateway client stopped");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
        }
    }

    #[allow(clippy::too_many_lines)] // One state machine per connection reads best in one place.
    async fn session(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        info!(url = %self.config.url, "connecting to discord gateway");
        let (stream, _) = connect_async(self.config.url.as_str()).await?;
        let (mut write, mut read) = stream.split();

        // ── HELLO ───────────────────────────────────────
        let hello: Hello = loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                next = tokio::time::timeout(HELLO_TIMEOUT, read.next()) => next,
            };
            let message = match next {
                Err(_) => return Err(AppError::Gateway("no hello from gateway".into())),
                Ok(None) => return Err(AppError::Gateway("gateway closed before hello".into())),
                Ok(Some(message)) => message?,
            };
            match message {
                Message::Text(text) => {
                    let frame: GatewayFrame = serde_json::from_str(text.as_str())?;
                    if frame.op == opcode::HELLO {
                        break decode(frame.d)?;
                    }
                    debug!(op = frame.op, "ignoring frame before hello");
                }
                Message::Close(frame) => {
                    return Ok(closed(close_parts(frame), false));
                }
                _ => {}
            }
        };

        let period = Duration::from_millis(hello.heartbeat_interval.max(1));
        debug!(heartbeat_ms = hello.heartbeat_interval, "gateway hello");

        // ── IDENTIFY ────────────────────────────────────
        write
            .send(Message::Text(
                protocol::identify(&self.config.token, self.config.intents).into(),
            ))
            .await?;

        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;
        let mut established = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Ok(SessionEnd::Reconnect {
                            reason: "heartbeat not acknowledged".into(),
                            established,
                        });
                    }
                    write.send(Message::Text(protocol::heartbeat(sequence).into())).await?;
                    awaiting_ack = true;
                }
                next = read.next() => {
                    let message = match next {
                        None => {
                            return Ok(SessionEnd::Reconnect {
                                reason: "gateway stream ended".into(),
                                established,
                            });
                        }
                        Some(Err(err)) => {
                            return Ok(SessionEnd::Reconnect {
                                reason: err.to_string(),
                                established,
                            });
                        }
                        Some(Ok(message)) => message,
                    };

                    let text = match message {
                        Message::Text(text) => text,
                        Message::Close(frame) => {
                            return Ok(closed(close_parts(frame), established));
                        }
                        _ => continue,
                    };

                    let frame: GatewayFrame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(%err, "unparseable gateway frame");
                            continue;
                        }
                    };
                    if let Some(seq) = frame.s {
                        sequence = Some(seq);
                    }

                    match frame.op {
                        opcode::DISPATCH => match self.dispatch(frame).await {
                            Ok(ready) => established |= ready,
                            Err(err) => warn!(%err, "failed to handle dispatch"),
                        },
                        opcode::HEARTBEAT => {
                            write.send(Message::Text(protocol::heartbeat(sequence).into())).await?;
                        }
                        opcode::HEARTBEAT_ACK => awaiting_ack = false,
                        opcode::RECONNECT => {
                            return Ok(SessionEnd::Reconnect {
                                reason: "gateway requested reconnect".into(),
                                established,
                            });
                        }
                        opcode::INVALID_SESSION => {
                            return Ok(SessionEnd::Reconnect {
                                reason: "session invalidated".into(),
                                established,
                            });
                        }
                        other => debug!(op = other, "ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    /// Handle one dispatch. Returns `true` for `READY`.
    async fn dispatch(&self, frame: GatewayFrame) -> Result<bool> {
        let Some(event) = frame.t else {
            return Ok(false);
        };

        match event.as_str() {
            "READY" => {
                let ready: Ready = decode(frame.d)?;
                info!(user = %ready.user.tag(), session = %ready.session_id, "bot online");
                return Ok(true);
            }
            "GUILD_CREATE" | "GUILD_UPDATE" => {
                let guild: RawGuild = decode(frame.d)?;
                debug!(guild = %guild.id, channels = guild.channels.len(), "guild cached");
                self.directory.upsert_guild(guild);
            }
            "GUILD_DELETE" => {
                let guild: RawGuildDelete = decode(frame.d)?;
                if !guild.unavailable {
                    self.directory.remove_guild(&guild.id);
                }
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" | "THREAD_CREATE" | "THREAD_UPDATE" => {
                let channel: RawChannel = decode(frame.d)?;
                self.directory.upsert_channel(channel);
            }
            "CHANNEL_DELETE" | "THREAD_DELETE" => {
                let channel: RawChannel = decode(frame.d)?;
                self.directory.remove_channel(&channel.id);
            }
            "MESSAGE_CREATE" => {
                let message: RawMessage = decode(frame.d)?;
                let event = self.directory.resolve(message);
                self.events
                    .send(event)
                    .await
                    .map_err(|_| AppError::Gateway("intake channel closed".into()))?;
            }
            other => debug!(event = other, "ignoring dispatch"),
        }

        Ok(false)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn close_parts(frame: Option<CloseFrame>) -> Option<(u16, String)> {
    frame.map(|frame| (u16::from(frame.code), frame.reason.as_str().to_owned()))
}

fn closed(frame: Option<(u16, String)>, established: bool) -> SessionEnd {
    match frame {
        Some((code, reason)) if protocol::is_fatal_close(code) => {
            SessionEnd::Fatal(format!("close code {code}: {reason}"))
        }
        Some((code, reason)) => SessionEnd::Reconnect {
            reason: format!("closed with code {code}: {reason}"),
            established,
        },
        None => SessionEnd::Reconnect {
            reason: "closed without a code".into(),
            established,
        },
    }
}

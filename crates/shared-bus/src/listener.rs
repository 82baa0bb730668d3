//! # Realtime Listener
//!
//! Per-connection task forwarding an identity's updates to its client.
//!
//! The task waits on three sources at once: frames sent by the client,
//! updates from the bus and a liveness timer. It ends when the client goes
//! away or the bus closes; in both cases a close frame is sent first and the
//! reason is then returned as an error.

use crate::events::RealtimeUpdate;
use crate::subscriber::Subscription;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

/// Frames received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Pong,
    Close,
}

/// Frames sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Update(RealtimeUpdate),
    Ping,
    Close,
}

/// Why a listener stopped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Realtime bus closed")]
    BusClosed,

    /// The outbound half of the connection is gone.
    #[error("Client sink closed")]
    SinkClosed,
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Period of the liveness ping.
    pub liveness_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_secs(30),
        }
    }
}

/// Run the listener until the client or the bus goes away.
///
/// Always returns an error describing why the connection ended.
pub async fn run_listener(
    mut subscription: Subscription,
    mut inbound: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::Sender<ServerFrame>,
    config: ListenerConfig,
) -> Result<(), ListenerError> {
    let period = config.liveness_interval;
    let mut liveness = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(ClientFrame::Close) | None => {
                    let _ = outbound.send(ServerFrame::Close).await;
                    info!(channels = ?subscription.filter().channels, "Client disconnected");
                    return Err(ListenerError::ClientDisconnected);
                }
                Some(other) => {
                    debug!(frame = ?other, "Ignoring client frame");
                }
            },
            update = subscription.recv() => match update {
                Some(update) => {
                    outbound
                        .send(ServerFrame::Update(update))
                        .await
                        .map_err(|_| ListenerError::SinkClosed)?;
                }
                None => {
                    let _ = outbound.send(ServerFrame::Close).await;
                    info!(channels = ?subscription.filter().channels, "Realtime bus closed");
                    return Err(ListenerError::BusClosed);
                }
            },
            _ = liveness.tick() => {
                outbound
                    .send(ServerFrame::Ping)
                    .await
                    .map_err(|_| ListenerError::SinkClosed)?;
            }
        }
    }
}

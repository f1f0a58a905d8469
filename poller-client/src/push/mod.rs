pub mod backoff;
pub mod frame;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde::Serialize;
use shared::types::StatusEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::error::PollerError;
use self::backoff::Backoff;
use self::frame::Inbound;
use self::transport::{Connection, Connector};

pub use self::backoff::ReconnectPolicy;

/// Lifecycle of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriberState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

/// Receives push channel callbacks, one call at a time.
#[async_trait]
pub trait PushHandler: Send + Sync {
    /// First successful open.
    async fn on_open(&self);

    /// Every later open, after a gap in which events may have been missed.
    async fn on_reconnect(&self);

    async fn on_event(&self, event: StatusEvent);
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Event-bus address to register on
    pub address: String,
    pub reconnect: ReconnectPolicy,
    /// Keepalive ping period, `Duration::ZERO` sends none
    pub ping_interval: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            address: shared::protocol::STATUS_ADDRESS.to_string(),
            reconnect: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(5),
        }
    }
}

/// Owner handle of a running subscriber task.
pub struct SubscriberHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<SubscriberState>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Start the subscription. The task runs until `shutdown` is called.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        handler: Arc<dyn PushHandler>,
        config: SubscriberConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SubscriberState::Connecting);

        let task = tokio::spawn(run(connector, handler, config, state_tx, cancel.clone()));

        Self {
            cancel,
            state_rx,
            task,
        }
    }

    pub fn state(&self) -> SubscriberState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriberState> {
        self.state_rx.clone()
    }

    /// Stop the subscription. No handler call happens after this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Push subscriber task failed: {}", e);
        }
    }
}

/// Why an open connection ended.
enum Ended {
    Cancelled,
    Failed(String),
}

async fn run(
    connector: Arc<dyn Connector>,
    handler: Arc<dyn PushHandler>,
    config: SubscriberConfig,
    state_tx: watch::Sender<SubscriberState>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(config.reconnect.clone());
    let mut opened_before = false;

    loop {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connector.connect() => result,
        };

        match connected {
            Ok(mut conn) => {
                if let Err(e) = conn.send(frame::register_frame(&config.address)).await {
                    tracing::warn!("Failed to register on {}: {}", config.address, e);
                    conn.close().await;
                } else {
                    backoff.reset();
                    let _ = state_tx.send(SubscriberState::Open);

                    if opened_before {
                        tracing::info!("Push channel reconnected on {}", config.address);
                        handler.on_reconnect().await;
                    } else {
                        tracing::info!("Push channel open on {}", config.address);
                        opened_before = true;
                        handler.on_open().await;
                    }

                    let ended = pump(conn.as_mut(), handler.as_ref(), &config, &cancel).await;
                    conn.close().await;
                    match ended {
                        Ended::Cancelled => break,
                        Ended::Failed(reason) => {
                            tracing::warn!("Push channel lost: {}", reason);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(attempt = backoff.attempt(), "Push channel connect failed: {}", e);
            }
        }

        let _ = state_tx.send(if opened_before {
            SubscriberState::Reconnecting
        } else {
            SubscriberState::Connecting
        });

        let Some(delay) = backoff.next_delay() else {
            tracing::error!(
                "Giving up on push channel after {} reconnect attempts",
                backoff.attempt()
            );
            break;
        };
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting push channel");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let _ = state_tx.send(SubscriberState::Closed);
    tracing::info!("Push subscriber shut down");
}

/// Deliver frames of one open connection until it fails or we are cancelled.
async fn pump(
    conn: &mut dyn Connection,
    handler: &dyn PushHandler,
    config: &SubscriberConfig,
    cancel: &CancellationToken,
) -> Ended {
    // A zero interval disables pings
    let pings = !config.ping_interval.is_zero();
    let mut ping = tokio::time::interval(config.ping_interval.max(Duration::from_millis(1)));
    // First tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ended::Cancelled,
            _ = ping.tick(), if pings => {
                if let Err(e) = conn.send(frame::ping_frame()).await {
                    return Ended::Failed(format!("ping failed: {e}"));
                }
            }
            received = conn.recv() => {
                let text = match received {
                    Some(Ok(text)) => text,
                    Some(Err(PollerError::Decode(e))) => {
                        tracing::warn!("Dropping undecodable push frame: {}", e);
                        continue;
                    }
                    Some(Err(e)) => return Ended::Failed(e.to_string()),
                    None => return Ended::Failed("closed by server".to_string()),
                };

                match frame::decode(&text, &config.address) {
                    Ok(Inbound::Status(event)) => handler.on_event(event).await,
                    Ok(Inbound::Error(message)) => {
                        tracing::warn!("Event bus bridge error: {}", message);
                    }
                    Ok(Inbound::Pong) | Ok(Inbound::Ignored) => {}
                    Err(e) => tracing::warn!("Dropping malformed push message: {}", e),
                }
            }
        }
    }
}

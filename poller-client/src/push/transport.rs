use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;
use crate::error::{PollerError, Result};

/// Opens push channel connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// One open text-frame connection.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next text frame, `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// Connects to the event-bus bridge over a raw websocket.
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        tracing::debug!(url = %self.url, "Connecting to push channel");
        let (stream, _) = connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bin)) => {
                    return Some(String::from_utf8(bin).map_err(|e| {
                        PollerError::Decode(format!("Non UTF-8 binary frame: {e}"))
                    }));
                }
                Ok(WsMessage::Close(frame)) => {
                    tracing::info!(?frame, "Push channel closed by server");
                    return None;
                }
                // tungstenite answers pings itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Error closing push channel: {}", e);
        }
    }
}

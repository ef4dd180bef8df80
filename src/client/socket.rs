use std::time::Duration;

use anyhow::{anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};

use crate::gateway::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Fixed-delay, bounded reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after the first failed dial.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy { attempts: 8, delay: Duration::from_secs(1) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

pub struct SocketClient {
    url: String,
    policy: ReconnectPolicy,
    state: ConnectionState,
    stream: Option<WsStream>,
    dials: u32,
}

impl SocketClient {
    /// `base_url` is the HTTP base of the server; the scheme is swapped for
    /// the websocket one.
    pub fn new(base_url: &str, token: &str, policy: ReconnectPolicy) -> SocketClient {
        SocketClient {
            url: gateway_url(base_url, token),
            policy,
            state: ConnectionState::Disconnected,
            stream: None,
            dials: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Dials made by the most recent connect cycle.
    pub fn dials(&self) -> u32 {
        self.dials
    }

    pub async fn connect(&mut self) -> anyhow::Result<()> {
        self.state = ConnectionState::Connecting;
        self.stream = None;
        self.dials = 0;

        let mut last_err = None;
        for attempt in 0..=self.policy.attempts {
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay).await;
            }
            self.dials += 1;

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    tracing::debug!(dials = self.dials, "gateway socket connected");
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(tungstenite::Error::Http(res)) if res.status().is_client_error() => {
                    self.state = ConnectionState::Disconnected;
                    bail!("gateway rejected the connection: {}", res.status());
                }
                Err(e) => {
                    tracing::warn!(attempt, "gateway dial failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(match last_err {
            Some(e) => anyhow!("gave up after {} dials: {e}", self.dials),
            None => anyhow!("gave up after {} dials", self.dials),
        })
    }

    /// Drops the current socket, if any, and starts a fresh bounded cycle.
    pub async fn reconnect(&mut self) -> anyhow::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        self.connect().await
    }

    pub async fn send(&mut self, event: &ClientEvent) -> anyhow::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            bail!("not connected");
        };
        let text = serde_json::to_string(event)?;
        stream.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    /// Next event from the gateway. A dropped socket is redialled under the
    /// policy; `Ok(None)` means the client was closed.
    pub async fn next_event(&mut self) -> anyhow::Result<Option<ServerEvent>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return match self.state {
                    ConnectionState::Disconnected => Ok(None),
                    _ => bail!("not connected"),
                };
            };

            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => tracing::warn!("skipping malformed gateway event: {e}"),
                },
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!("gateway socket dropped, reconnecting");
                    self.connect().await?;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        self.state = ConnectionState::Disconnected;
    }
}

fn gateway_url(base_url: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };
    format!("{base}/api/ws?token={token}")
}

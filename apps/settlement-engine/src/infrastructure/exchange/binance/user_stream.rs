//! User data stream over WebSocket.
//!
//! A session owns one listen key: created on open, kept alive on a timer
//! while events are read, deleted on close.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Method;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::api_types::ListenKeyResponse;
use super::config::BinanceConfig;
use super::http_client::BinanceHttpClient;
use crate::application::ports::{ExecutionStreamPort, StreamError, StreamEvent, StreamSession};
use crate::infrastructure::websocket::ExecutionReportCodec;

const USER_STREAM_PATH: &str = "/api/v3/userDataStream";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens user data stream sessions.
#[derive(Debug, Clone)]
pub struct BinanceUserStream {
    client: BinanceHttpClient,
    ws_base_url: String,
    keepalive: Duration,
    codec: ExecutionReportCodec,
}

impl BinanceUserStream {
    /// Create a stream factory sharing `client` with the REST adapter.
    #[must_use]
    pub fn new(
        client: BinanceHttpClient,
        config: &BinanceConfig,
        exchange_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ws_base_url: config.ws_base_url().trim_end_matches('/').to_string(),
            keepalive: config.listen_key_keepalive,
            codec: ExecutionReportCodec::new(exchange_name),
        }
    }
}

#[async_trait]
impl ExecutionStreamPort for BinanceUserStream {
    type Session = BinanceStreamSession;

    async fn open(&self) -> Result<Self::Session, StreamError> {
        let ListenKeyResponse { listen_key } = self
            .client
            .keyed(Method::POST, USER_STREAM_PATH, &[])
            .await
            .map_err(|e| StreamError::Connect {
                message: format!("listen key request failed: {e}"),
            })?;

        let url = format!("{}/{listen_key}", self.ws_base_url);
        let socket = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(e) => {
                release_listen_key(&self.client, &listen_key).await.ok();
                return Err(StreamError::Connect {
                    message: format!("websocket connect failed: {e}"),
                });
            }
        };
        tracing::info!(base_url = %self.ws_base_url, "User data stream connected");

        Ok(BinanceStreamSession {
            socket,
            client: self.client.clone(),
            listen_key,
            keepalive: tokio::time::interval_at(Instant::now() + self.keepalive, self.keepalive),
            codec: self.codec.clone(),
        })
    }
}

/// One connected user data stream.
pub struct BinanceStreamSession {
    socket: Socket,
    client: BinanceHttpClient,
    listen_key: String,
    keepalive: Interval,
    codec: ExecutionReportCodec,
}

impl std::fmt::Debug for BinanceStreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceStreamSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl StreamSession for BinanceStreamSession {
    async fn next_event(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        loop {
            tokio::select! {
                _ = self.keepalive.tick() => {
                    let params = [("listenKey", self.listen_key.clone())];
                    if let Err(e) = self
                        .client
                        .keyed::<serde_json::Value>(Method::PUT, USER_STREAM_PATH, &params)
                        .await
                    {
                        return Some(Err(StreamError::Transport {
                            message: format!("listen key keepalive failed: {e}"),
                        }));
                    }
                    tracing::debug!("Listen key kept alive");
                }
                message = self.socket.next() => match message {
                    Some(Ok(Message::Text(text))) => return Some(self.codec.decode(text.as_str())),
                    Some(Ok(Message::Binary(data))) => {
                        return Some(match std::str::from_utf8(&data) {
                            Ok(text) => self.codec.decode(text),
                            Err(e) => Err(StreamError::Decode {
                                message: format!("non-UTF8 binary frame: {e}"),
                            }),
                        });
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = self.socket.send(Message::Pong(payload)).await {
                            return Some(Err(StreamError::Transport {
                                message: e.to_string(),
                            }));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Server sent close frame");
                        return None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Some(Err(StreamError::Transport {
                            message: e.to_string(),
                        }));
                    }
                    None => return None,
                },
            }
        }
    }

    async fn close(mut self) -> Result<(), StreamError> {
        let socket = self.socket.close(None).await;
        let release = release_listen_key(&self.client, &self.listen_key).await;
        tracing::info!("User data stream closed");

        if let Err(e) = socket {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
        release
    }
}

async fn release_listen_key(client: &BinanceHttpClient, listen_key: &str) -> Result<(), StreamError> {
    client
        .keyed::<serde_json::Value>(
            Method::DELETE,
            USER_STREAM_PATH,
            &[("listenKey", listen_key.to_string())],
        )
        .await
        .map(|_| ())
        .map_err(|e| StreamError::Close {
            message: format!("listen key release failed: {e}"),
        })
}

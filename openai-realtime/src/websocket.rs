//! WebSocket-based realtime session.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, warn};

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::event::ServerEvent;
use crate::session::Session;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket-based realtime session.
pub struct WebSocketSession {
    write_tx: mpsc::Sender<Message>,
    event_rx: Mutex<mpsc::Receiver<Result<ServerEvent>>>,
    session_id: StdMutex<Option<String>>,
    read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
}

impl WebSocketSession {
    /// Connects to the realtime endpoint.
    pub(crate) async fn connect(config: &ClientConfig, model: &str) -> Result<Self> {
        let url = format!("{}?model={}", config.ws_url, model);
        debug!(%url, "connecting");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Connection(format!("invalid websocket url: {}", e)))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", header(&format!("Bearer {}", config.api_key))?);
        if config.beta_header {
            headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        }
        if let Some(org) = &config.organization {
            headers.insert("OpenAI-Organization", header(org)?);
        }
        if let Some(project) = &config.project {
            headers.insert("OpenAI-Project", header(project)?);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::Connection(format!("failed to connect: {}", e)))?;
        let (write, read) = ws_stream.split();

        let (event_tx, event_rx) = mpsc::channel(config.buffer_size);
        let (write_tx, write_rx) = mpsc::channel(config.buffer_size);

        let write_handle = tokio::spawn(write_loop(write, write_rx));
        let read_handle = tokio::spawn(read_loop(read, event_tx));

        Ok(Self {
            write_tx,
            event_rx: Mutex::new(event_rx),
            session_id: StdMutex::new(None),
            read_handle,
            _write_handle: write_handle,
        })
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.read_handle.abort();
    }
}

#[async_trait]
impl Session for WebSocketSession {
    async fn send_raw(&self, event: serde_json::Value) -> Result<()> {
        let text = event.to_string();
        debug!("sending event: {}", truncate_for_log(&text, 500));
        self.write_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn recv(&self) -> Option<Result<ServerEvent>> {
        let result = self.event_rx.lock().await.recv().await?;

        if let Ok(ServerEvent::Session(event)) = &result {
            if !event.session.id.is_empty() {
                if let Ok(mut id) = self.session_id.lock() {
                    *id = Some(event.session.id.clone());
                }
            }
        }

        Some(result)
    }

    async fn close(&self) -> Result<()> {
        let _ = self.write_tx.send(Message::Close(None)).await;
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }
}

fn header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidConfig(format!("invalid header value: {}", e)))
}

async fn write_loop(mut write: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Message::Close(_) = msg {
            let _ = write.close().await;
            break;
        }
        if let Err(e) = write.send(msg).await {
            error!("write error: {}", e);
            break;
        }
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<Result<ServerEvent>>) {
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("received: {}", truncate_for_log(&text, 1000));
                let event = ServerEvent::parse(&text);
                if let Err(e) = &event {
                    warn!(error = %e, "undecodable server event");
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket closed by server");
                break;
            }
            Ok(Message::Ping(_)) => {}
            Ok(_) => {}
            Err(e) => {
                error!("read error: {}", e);
                let _ = tx.send(Err(Error::WebSocket(e))).await;
                break;
            }
        }
    }
}

pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("héllo", 2), "h...");
    }
}

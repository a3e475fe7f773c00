//! In-process transport.
//!
//! [`channel`] returns a [`ChannelSession`] that behaves like a connected
//! realtime session and a [`ChannelPeer`] that plays the server: it pushes raw
//! JSON events and reads what the client sent. Useful for replaying captured
//! streams and for testing code built on [`Session`].

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client_event::ClientEvent;
use crate::error::{Error, Result};
use crate::event::ServerEvent;
use crate::session::Session;

/// Creates a connected session/peer pair with bounded buffers.
pub fn channel(capacity: usize) -> (ChannelSession, ChannelPeer) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let session = ChannelSession {
        requests: request_tx,
        events: Mutex::new(event_rx),
        session_id: StdMutex::new(None),
        closed: CancellationToken::new(),
    };
    let peer = ChannelPeer {
        events: event_tx,
        requests: request_rx,
    };
    (session, peer)
}

/// Client side of an in-process transport.
pub struct ChannelSession {
    requests: mpsc::Sender<Value>,
    events: Mutex<mpsc::Receiver<Value>>,
    session_id: StdMutex<Option<String>>,
    closed: CancellationToken,
}

#[async_trait]
impl Session for ChannelSession {
    async fn send_raw(&self, event: Value) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        self.requests
            .send(event)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn recv(&self) -> Option<Result<ServerEvent>> {
        let value = tokio::select! {
            _ = self.closed.cancelled() => return None,
            value = async { self.events.lock().await.recv().await } => value?,
        };
        let result = ServerEvent::from_value(value);
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
        debug!("closing channel session");
        self.closed.cancel();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }
}

/// Server side of an in-process transport.
pub struct ChannelPeer {
    events: mpsc::Sender<Value>,
    requests: mpsc::Receiver<Value>,
}

impl ChannelPeer {
    /// Delivers a raw server event.
    pub async fn send(&self, event: Value) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Delivers a sequence of raw server events in order.
    pub async fn send_all(&self, events: impl IntoIterator<Item = Value>) -> Result<()> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }

    /// Next raw event the client sent, or `None` once the client is gone.
    pub async fn recv_raw(&mut self) -> Option<Value> {
        self.requests.recv().await
    }

    /// Next client event, decoded.
    pub async fn recv(&mut self) -> Option<Result<ClientEvent>> {
        let value = self.requests.recv().await?;
        Some(serde_json::from_value(value).map_err(Error::from))
    }

    /// Ends the server stream; the session's `recv` returns `None` after
    /// draining buffered events.
    pub fn hang_up(self) {
        drop(self.events);
    }
}

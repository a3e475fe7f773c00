//! OpenAI Realtime API client for Rust.
//!
//! The server streams a conversation as many small events: items are
//! announced, their content parts are opened, text, audio and function
//! arguments arrive as deltas and are then settled by `done` events. This
//! crate decodes those events and reconciles them into a consistent model.
//!
//! # Layers
//!
//! - [`ServerEvent`] decodes one wire event; [`event::classify`] maps a tag
//!   to its [`EventKind`] through an ordered route table.
//! - [`Item`] and [`Conversation`] merge events into ordered items with
//!   accumulated text, audio, transcripts and arguments.
//! - [`Exchange`] pumps a [`Session`] in the background, notifies an
//!   [`Observer`] and answers function calls.
//! - [`WebSocketSession`] and [`ChannelSession`] are the transports.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use orca_openai_realtime::{
//!     Client, ClientEvent, ConversationItem, Exchange, NoopObserver, Session, SessionConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::from_env()?;
//!     let session = client.connect_websocket(None).await?;
//!     let exchange = Exchange::spawn(Arc::new(session), Arc::new(NoopObserver));
//!     let cancel = CancellationToken::new();
//!
//!     let config = SessionConfig {
//!         modalities: vec!["text".to_string()],
//!         ..SessionConfig::with_vad_disabled()
//!     };
//!     exchange.session().update_session(&config).await?;
//!     exchange
//!         .session()
//!         .send(ClientEvent::create_item(ConversationItem::user_text("Hello!")))
//!         .await?;
//!
//!     exchange.start(ClientEvent::create_response(None), &cancel).await?;
//!     let status = exchange
//!         .wait_for_terminal(Duration::from_secs(30), &cancel)
//!         .await?;
//!     println!("response {:?}", status);
//!
//!     for item in exchange.snapshot().await {
//!         println!("{}: {}", item.id.as_deref().unwrap_or("?"), item.text());
//!     }
//!
//!     exchange.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod client_event;
pub mod conversation;
pub mod error;
pub mod event;
pub mod exchange;
pub mod item;
pub mod session;
pub mod types;
pub mod websocket;

pub use channel::{ChannelPeer, ChannelSession, channel};
pub use client::{Client, ClientBuilder};
pub use client_event::ClientEvent;
pub use conversation::{Conversation, ResponseState, ResponseStatus, ToolCall, Update};
pub use error::{Anomaly, ApiError, Error, Result, ToolInvocationError};
pub use event::{EventKind, Phase, ServerEvent};
pub use exchange::{Exchange, NoopObserver, Observer};
pub use item::{Item, ItemSnapshot, ItemStatus, ItemType, Part, PartSnapshot, PartType, Role};
pub use session::Session;
pub use types::*;
pub use websocket::WebSocketSession;

#[cfg(test)]
mod tests;

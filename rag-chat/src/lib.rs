//! Rag Chat - streaming ask client for the RAG chat service.
//!
//! One ask is one [`Exchange`]: a query sent to `/ask/stream`, answered by a
//! sequence of Server-Sent Events that carry answer fragments, the rewritten
//! query, retrieved documents, and a replacement conversation history token.
//! [`ChatClient`] owns the [`SessionState`] threaded from one exchange to the
//! next and enforces that only one exchange is open at a time.
//!
//! # Example
//!
//! ```ignore
//! let client = ChatClient::new(&config)?;
//! let handle = client.start_exchange("how do I resize an image?")?;
//! let exchange = present(handle, &mut my_presenter).await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod event;
pub mod exchange;
pub mod presenter;
pub mod render;
pub mod service;
pub mod session;
pub mod terminal;

pub use client::{ChatClient, ExchangeHandle, WireEvent};
pub use error::{ChatError, ChatResult};
pub use event::{Document, EndSummary, ProtocolError, StreamEvent, PROTOCOL_REVISION};
pub use exchange::{Exchange, ExchangeStatus, ExchangeUpdate};
pub use presenter::{dispatch, present, Presenter};
pub use service::{AskResponse, RemoteConfig, ServiceClient};
pub use session::SessionState;
pub use terminal::{RenderMode, TerminalPresenter};

//! Exchange state machine.
//!
//! One [`Exchange`] covers one query and one event-stream connection. It is
//! transport-free: the driver in [`crate::client`] feeds it decoded events in
//! arrival order and forwards the [`ExchangeUpdate`]s it returns to the
//! single consumer.
//!
//! ```text
//!          message / history / rewritten_query / documents
//!            ┌────┐
//!            ▼    │
//!  open ──▶ Open ─┴──── end ────▶ Ended     (Finalized, once)
//!            │
//!            └── transport error ─▶ Errored (Error, once)
//! ```

use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};
use crate::event::{Document, EndSummary, StreamEvent};
use crate::session::SessionState;

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Open,
    Ended,
    Errored,
}

/// Render instruction for the presentation layer.
///
/// The full vocabulary of the protocol handler; consumers match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeUpdate {
    /// The user's own query, emitted before any network activity.
    UserMessage(String),
    /// Full accumulated answer text after a new fragment (cheap render path).
    PartialText(String),
    /// Complete answer text after `end` (rich render path, once).
    Finalized(String),
    HistoryUpdated(String),
    RewrittenQuery(String),
    Documents(Vec<Document>),
    /// Transport failure; the exchange is over and was not finalized.
    Error(String),
}

impl ExchangeUpdate {
    /// Whether this is the last update of its exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized(_) | Self::Error(_))
    }
}

/// One query/answer cycle.
#[derive(Debug, Clone)]
pub struct Exchange {
    query: String,
    accumulated_text: String,
    fragments: usize,
    documents: Vec<Document>,
    rewritten_query: Option<String>,
    summary: Option<EndSummary>,
    error: Option<String>,
    status: ExchangeStatus,
}

impl Exchange {
    /// Open an exchange for `query`. Surrounding whitespace is dropped; a
    /// query that is empty afterwards is rejected.
    pub fn open(query: &str) -> ChatResult<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        Ok(Self {
            query: query.to_string(),
            accumulated_text: String::new(),
            fragments: 0,
            documents: Vec::new(),
            rewritten_query: None,
            summary: None,
            error: None,
            status: ExchangeStatus::Open,
        })
    }

    /// The update announcing the user's query.
    pub fn user_message(&self) -> ExchangeUpdate {
        ExchangeUpdate::UserMessage(self.query.clone())
    }

    /// Apply one event. Events arriving after the exchange closed are dropped.
    pub fn apply(
        &mut self,
        event: StreamEvent,
        session: &mut SessionState,
    ) -> Option<ExchangeUpdate> {
        if self.status != ExchangeStatus::Open {
            debug!(event = event.name(), status = ?self.status, "Dropping event after close");
            return None;
        }

        match event {
            StreamEvent::Start { session_id } => {
                match session_id {
                    Some(id) => {
                        info!(session_id = %id, "Session started");
                        session.set_session_id(id);
                    }
                    None => debug!("Exchange started without a session id"),
                }
                None
            }
            StreamEvent::Message(fragment) => {
                self.accumulated_text.push_str(&fragment);
                self.fragments += 1;
                Some(ExchangeUpdate::PartialText(self.accumulated_text.clone()))
            }
            StreamEvent::History(blob) => {
                session.set_history(blob.clone());
                Some(ExchangeUpdate::HistoryUpdated(blob))
            }
            StreamEvent::RewrittenQuery(text) => {
                self.rewritten_query = Some(text.clone());
                Some(ExchangeUpdate::RewrittenQuery(text))
            }
            StreamEvent::Documents(documents) => {
                self.documents = documents.clone();
                Some(ExchangeUpdate::Documents(documents))
            }
            StreamEvent::End(summary) => {
                info!(
                    fragments = self.fragments,
                    chars = self.accumulated_text.chars().count(),
                    server_parts = ?summary.parts,
                    server_duration = ?summary.duration,
                    "Exchange ended"
                );
                self.summary = Some(summary);
                self.status = ExchangeStatus::Ended;
                Some(ExchangeUpdate::Finalized(self.accumulated_text.clone()))
            }
        }
    }

    /// Mark the exchange failed. Only the first failure of an open exchange
    /// produces an update; accumulated text is kept as is.
    pub fn fail(&mut self, error: impl Into<String>) -> Option<ExchangeUpdate> {
        if self.status != ExchangeStatus::Open {
            return None;
        }
        let error = error.into();
        self.status = ExchangeStatus::Errored;
        self.error = Some(error.clone());
        Some(ExchangeUpdate::Error(error))
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Number of `message` fragments received.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn rewritten_query(&self) -> Option<&str> {
        self.rewritten_query.as_deref()
    }

    pub fn summary(&self) -> Option<&EndSummary> {
        self.summary.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ExchangeStatus::Open
    }
}

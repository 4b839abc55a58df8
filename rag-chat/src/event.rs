//! Wire events of the `/ask/stream` endpoint.
//!
//! The server speaks Server-Sent Events. Every payload is JSON (protocol
//! revision 2); the answer fragments arrive on the unnamed default event,
//! which SSE clients surface with the event type `message`.
//!
//! ```text
//! event: start            data: {"session_id": "abc"}
//! event: rewritten_query  data: "what is aperturedb"
//! (default)               data: "Hel"
//! (default)               data: "lo"
//! event: documents        data: [{"url": "...", "text": "..."}]
//! event: history          data: "<opaque blob>"
//! event: end              data: {"duration": 1.2, "parts": 2}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol revision spoken by this client.
///
/// Revision 2 threads conversation state through the `history` query
/// parameter and JSON-encodes every payload, including answer fragments.
pub const PROTOCOL_REVISION: u32 = 2;

/// SSE event type names.
pub mod names {
    pub const START: &str = "start";
    pub const MESSAGE: &str = "message";
    pub const HISTORY: &str = "history";
    pub const REWRITTEN_QUERY: &str = "rewritten_query";
    pub const DOCUMENTS: &str = "documents";
    pub const END: &str = "end";
}

/// A retrieved source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub text: String,
}

/// Optional statistics carried by the `end` event. Never affects the answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndSummary {
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub parts: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(default)]
    session_id: Option<String>,
}

/// A decoded event from the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Exchange accepted; may carry the server's session identifier
    Start { session_id: Option<String> },
    /// One fragment of answer text
    Message(String),
    /// Replacement conversation history token
    History(String),
    /// The query as rewritten by the server before retrieval
    RewrittenQuery(String),
    /// Documents retrieved for this answer
    Documents(Vec<Document>),
    /// Terminal event
    End(EndSummary),
}

/// Payload that does not match the encoding expected for its event type.
#[derive(Debug, Error)]
#[error("malformed '{event}' payload: {source}")]
pub struct ProtocolError {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

impl StreamEvent {
    /// Decode one SSE event.
    ///
    /// Returns `Ok(None)` for event types this client does not know about.
    /// An empty event type is treated as the default `message` event.
    pub fn parse(event_type: &str, data: &str) -> Result<Option<Self>, ProtocolError> {
        let malformed = |source| ProtocolError {
            event: event_type.to_string(),
            source,
        };

        let event = match event_type {
            names::START => {
                let payload: StartPayload = serde_json::from_str(data).map_err(malformed)?;
                Self::Start {
                    session_id: payload.session_id,
                }
            }
            "" | names::MESSAGE => Self::Message(serde_json::from_str(data).map_err(malformed)?),
            names::HISTORY => Self::History(serde_json::from_str(data).map_err(malformed)?),
            names::REWRITTEN_QUERY => {
                Self::RewrittenQuery(serde_json::from_str(data).map_err(malformed)?)
            }
            names::DOCUMENTS => Self::Documents(serde_json::from_str(data).map_err(malformed)?),
            // The end payload is informational; anything unreadable becomes an empty summary.
            names::END => Self::End(serde_json::from_str(data).unwrap_or_default()),
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// The SSE event type this event travels under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => names::START,
            Self::Message(_) => names::MESSAGE,
            Self::History(_) => names::HISTORY,
            Self::RewrittenQuery(_) => names::REWRITTEN_QUERY,
            Self::Documents(_) => names::DOCUMENTS,
            Self::End(_) => names::END,
        }
    }
}

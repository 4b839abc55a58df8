//! Client error type.

/// Result type for client operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors raised by the ask client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Query was empty after trimming; nothing was sent.
    #[error("query is empty")]
    EmptyQuery,

    /// Another exchange on this client has not reached `end` or an error yet.
    #[error("an exchange is already in progress")]
    ExchangeInProgress,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Connection failed or was reset.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server closed the stream without sending `end`.
    #[error("stream closed before the end event")]
    StreamClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange task panicked or was aborted.
    #[error("exchange task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Common(#[from] rag_common::Error),
}

impl ChatError {
    /// Whether the error was raised before any network activity.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery
                | Self::ExchangeInProgress
                | Self::Common(rag_common::Error::InvalidInput(_))
        )
    }

    /// Whether the server rejected our credentials.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Common(err) => err.is_auth(),
            Self::Http(err) => err.status().is_some_and(|s| s.as_u16() == 401),
            _ => false,
        }
    }

    /// Whether the operation gave up waiting.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Common(err) => err.is_timeout(),
            Self::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

//! Cross-exchange continuity state.

/// Session identifier and latest history token.
///
/// Both start empty. Only the exchange state machine writes to it: the
/// session id is overwritten by every `start` event that carries one, and the
/// history token is replaced wholesale by every `history` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    session_id: Option<String>,
    history: Option<String>,
}

impl SessionState {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    pub fn set_history(&mut self, history: impl Into<String>) {
        self.history = Some(history.into());
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn history(&self) -> Option<&str> {
        self.history.as_deref()
    }
}

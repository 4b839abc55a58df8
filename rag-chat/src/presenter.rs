//! Presentation boundary.
//!
//! The protocol handler only produces [`ExchangeUpdate`]s. A [`Presenter`]
//! turns them into pixels (or terminal output); [`dispatch`] maps each
//! update to exactly one callback.

use crate::client::ExchangeHandle;
use crate::error::ChatResult;
use crate::event::Document;
use crate::exchange::{Exchange, ExchangeUpdate};

/// Callback surface required from a presentation layer.
///
/// Per exchange: `on_user_message` once, `on_partial_text` once per answer
/// fragment, and at most one of `on_finalized` / `on_error`.
pub trait Presenter {
    /// The user's query, shown before any network activity.
    fn on_user_message(&mut self, text: &str);

    /// Cheap render of the full answer text accumulated so far.
    fn on_partial_text(&mut self, full_text: &str);

    /// Rich render of the complete answer.
    fn on_finalized(&mut self, full_text: &str);

    fn on_history_updated(&mut self, _blob: &str) {}

    fn on_rewritten_query(&mut self, _text: &str) {}

    fn on_documents(&mut self, _documents: &[Document]) {}

    fn on_error(&mut self, error: &str);
}

/// Route one update to its callback.
pub fn dispatch<P: Presenter + ?Sized>(presenter: &mut P, update: &ExchangeUpdate) {
    match update {
        ExchangeUpdate::UserMessage(text) => presenter.on_user_message(text),
        ExchangeUpdate::PartialText(text) => presenter.on_partial_text(text),
        ExchangeUpdate::Finalized(text) => presenter.on_finalized(text),
        ExchangeUpdate::HistoryUpdated(blob) => presenter.on_history_updated(blob),
        ExchangeUpdate::RewrittenQuery(text) => presenter.on_rewritten_query(text),
        ExchangeUpdate::Documents(documents) => presenter.on_documents(documents),
        ExchangeUpdate::Error(error) => presenter.on_error(error),
    }
}

/// Drive a running exchange to completion through `presenter`.
pub async fn present<P: Presenter + ?Sized>(
    mut handle: ExchangeHandle,
    presenter: &mut P,
) -> ChatResult<Exchange> {
    while let Some(update) = handle.next_update().await {
        dispatch(presenter, &update);
        if update.is_terminal() {
            break;
        }
    }
    handle.finish().await
}

//! Terminal presentation layer used by the CLI.

use std::io::Write;

use rag_common::util::truncate_with_ellipsis;
use tracing::{debug, error};

use crate::event::Document;
use crate::presenter::Presenter;
use crate::render::{render_markdown, render_plain};

/// How the finalized answer is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Streamed text is followed by a Markdown-styled copy of the answer.
    #[default]
    Rich,
    /// Streamed text only.
    Plain,
}

/// Writes an exchange to a terminal.
///
/// A terminal cannot repaint earlier output cheaply, so each partial update
/// prints only what extends the text already shown. If the full text no longer
/// starts with what was shown, it is printed again on a fresh line.
pub struct TerminalPresenter<W: Write> {
    out: W,
    mode: RenderMode,
    shown: String,
    show_documents: bool,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, mode: RenderMode) -> Self {
        Self {
            out,
            mode,
            shown: String::new(),
            show_documents: true,
        }
    }

    pub fn with_documents(mut self, show: bool) -> Self {
        self.show_documents = show;
        self
    }

    /// Consume the presenter and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            error!(error = %e, "Failed to write to terminal");
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn on_user_message(&mut self, text: &str) {
        self.shown.clear();
        self.write(&format!("\x1b[1mYou:\x1b[0m {text}\n\x1b[1mBot:\x1b[0m "));
    }

    fn on_partial_text(&mut self, full_text: &str) {
        let rendered = render_plain(full_text);
        match rendered.strip_prefix(self.shown.as_str()) {
            Some(tail) => {
                let tail = tail.to_string();
                self.write(&tail);
            }
            None => self.write(&format!("\n{rendered}")),
        }
        self.shown = rendered;
    }

    fn on_finalized(&mut self, full_text: &str) {
        let mut block = String::from("\n");
        if self.mode == RenderMode::Rich && !full_text.trim().is_empty() {
            block.push_str("\x1b[2m────────\x1b[0m\n");
            block.push_str(&render_markdown(full_text));
            block.push('\n');
        }
        self.write(&block);
        self.shown.clear();
    }

    fn on_history_updated(&mut self, blob: &str) {
        debug!(chars = blob.chars().count(), "History updated");
    }

    fn on_rewritten_query(&mut self, text: &str) {
        debug!(rewritten_query = %text, "Query rewritten by server");
    }

    fn on_documents(&mut self, documents: &[Document]) {
        if !self.show_documents || documents.is_empty() {
            return;
        }
        let mut block = String::from("\n\x1b[2mSources:\n");
        for (i, doc) in documents.iter().enumerate() {
            let excerpt = truncate_with_ellipsis(&doc.text.replace('\n', " "), 80);
            block.push_str(&format!("  [{}] {} - {}\n", i + 1, doc.url, excerpt));
        }
        block.push_str("\x1b[0m");
        self.write(&block);
    }

    fn on_error(&mut self, err: &str) {
        error!(error = %err, "Exchange failed");
        self.write("\n");
    }
}

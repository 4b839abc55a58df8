//! Streaming ask client.
//!
//! [`ChatClient::start_exchange`] opens one event-stream connection per query
//! and runs it on a background task that feeds the [`Exchange`] state
//! machine. Updates reach the caller through a channel in arrival order:
//!
//! ```text
//!  start_exchange ──▶ UserMessage ──┐
//!                                   │  mpsc
//!  /ask/stream ─ SSE ─▶ drive() ────┼──────▶ ExchangeHandle ─▶ Presenter
//!                        │          │
//!                        ▼          │
//!                   SessionState    │
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use eventsource_client::{self as es, Client as _, SSE};
use futures_util::{future, stream, Stream, StreamExt};
use rag_common::util::{sanitize_for_log, truncate_with_ellipsis};
use rag_common::{logging, Config};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use crate::error::{ChatError, ChatResult};
use crate::event::StreamEvent;
use crate::exchange::{Exchange, ExchangeUpdate};
use crate::session::SessionState;

/// Path of the streaming endpoint, relative to the service base URL.
pub const STREAM_PATH: &str = "ask/stream";

/// One raw event as delivered by the event-stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub event_type: String,
    pub data: String,
}

impl WireEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Parse a service base URL so that relative paths resolve beneath it.
pub(crate) fn base_url(endpoint: &str) -> ChatResult<Url> {
    let normalized = format!("{}/", endpoint.trim_end_matches('/'));
    let url = Url::parse(&normalized)
        .map_err(|e| ChatError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ChatError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(url)
}

/// Lock the shared session, recovering the data if a holder panicked.
fn lock(session: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an exchange as open for as long as it lives.
struct OpenGuard(Arc<AtomicBool>);

impl OpenGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> ChatResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ChatError::ExchangeInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Receiving side of a running exchange.
pub struct ExchangeHandle {
    updates: mpsc::Receiver<ExchangeUpdate>,
    task: JoinHandle<Exchange>,
}

impl ExchangeHandle {
    /// Next update, or `None` once the exchange is over and drained.
    pub async fn next_update(&mut self) -> Option<ExchangeUpdate> {
        self.updates.recv().await
    }

    /// Drain the remaining updates and wait for the final exchange state.
    pub async fn finish(mut self) -> ChatResult<Exchange> {
        while self.updates.recv().await.is_some() {}
        self.task.await.map_err(|e| ChatError::Task(e.to_string()))
    }

    /// Collect every remaining update, then the final exchange state.
    pub async fn collect(mut self) -> ChatResult<(Vec<ExchangeUpdate>, Exchange)> {
        let mut updates = Vec::new();
        while let Some(update) = self.updates.recv().await {
            updates.push(update);
        }
        let exchange = self.task.await.map_err(|e| ChatError::Task(e.to_string()))?;
        Ok((updates, exchange))
    }
}

/// Client for the streaming ask endpoint.
///
/// Holds the session state shared by successive exchanges. At most one
/// exchange is open at a time; a second `start_exchange` before the first
/// one ended or failed is rejected with [`ChatError::ExchangeInProgress`].
pub struct ChatClient {
    base: Url,
    token: Option<String>,
    channel_capacity: usize,
    connect_timeout: Duration,
    session: Arc<Mutex<SessionState>>,
    open: Arc<AtomicBool>,
}

impl ChatClient {
    /// Create a client from configuration with an empty session.
    pub fn new(config: &Config) -> ChatResult<Self> {
        Ok(Self {
            base: base_url(config.endpoint())?,
            token: config.server.token.clone(),
            channel_capacity: config.stream.channel_capacity.max(1),
            connect_timeout: Duration::from_secs(config.stream.connect_timeout_secs),
            session: Arc::new(Mutex::new(SessionState::new())),
            open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a client against `endpoint` with default settings.
    pub fn with_endpoint(endpoint: impl Into<String>) -> ChatResult<Self> {
        let mut config = Config::default();
        config.server.endpoint = endpoint.into();
        Self::new(&config)
    }

    /// Set the bearer token sent with every stream request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Bound the wait for the stream connection to be established.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the session state, e.g. to continue a known conversation.
    pub fn with_session(self, session: SessionState) -> Self {
        *lock(&self.session) = session;
        self
    }

    /// Snapshot of the current session state.
    pub fn session(&self) -> SessionState {
        lock(&self.session).clone()
    }

    /// Whether an exchange is currently open.
    pub fn is_exchange_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// URL of the stream request for `query`, threading `history` when present.
    pub fn stream_url(&self, query: &str, history: Option<&str>) -> ChatResult<Url> {
        let mut url = self
            .base
            .join(STREAM_PATH)
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            if let Some(history) = history {
                pairs.append_pair("history", history);
            }
        }
        Ok(url)
    }

    /// Start one exchange.
    ///
    /// Rejects an empty query before anything is sent. Otherwise the first
    /// update on the returned handle is always [`ExchangeUpdate::UserMessage`],
    /// queued before the connection is opened. Must be called from within a
    /// tokio runtime.
    pub fn start_exchange(&self, query: &str) -> ChatResult<ExchangeHandle> {
        let exchange = Exchange::open(query)?;
        let guard = OpenGuard::acquire(&self.open)?;

        let history = lock(&self.session).history().map(str::to_string);
        let url = self.stream_url(exchange.query(), history.as_deref())?;
        let client = self.build_stream_client(&url)?;

        let exchange_id = logging::generate_exchange_id();
        info!(
            exchange_id = %exchange_id,
            query = %truncate_with_ellipsis(&sanitize_for_log(exchange.query()), 80),
            has_history = history.is_some(),
            "Starting exchange"
        );

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        // Fresh channel with capacity >= 1, so this cannot fail.
        let _ = tx.try_send(exchange.user_message());

        let session = Arc::clone(&self.session);
        let connect_timeout = self.connect_timeout;
        let span = tracing::info_span!("exchange", exchange_id = %exchange_id);
        let task = tokio::spawn(
            async move {
                let mut raw = client.stream();
                // Only the connection step is bounded; an idle stream may wait forever.
                let head = match tokio::time::timeout(connect_timeout, raw.next()).await {
                    Ok(first) => first.and_then(into_wire),
                    Err(_) => {
                        warn!(timeout = ?connect_timeout, "Event stream connect timed out");
                        Some(Err(format!("connection timed out after {connect_timeout:?}")))
                    }
                };
                let events = stream::iter(head)
                    .chain(raw.filter_map(|item| future::ready(into_wire(item))));
                run_exchange(Box::pin(events), exchange, session, tx, guard).await
            }
            .instrument(span),
        );

        Ok(ExchangeHandle { updates: rx, task })
    }

    fn build_stream_client(&self, url: &Url) -> ChatResult<impl es::Client> {
        let mut builder = es::ClientBuilder::for_url(url.as_str())
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?
            // A dropped stream ends the exchange; it is never resumed.
            .reconnect(es::ReconnectOptions::reconnect(false).retry_initial(false).build());

        if let Some(ref token) = self.token {
            builder = builder
                .header("Authorization", &format!("Bearer {}", token))
                .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?;
        }

        Ok(builder.build())
    }
}

/// Map one transport item to a wire event or a transport failure.
fn into_wire(item: Result<SSE, es::Error>) -> Option<Result<WireEvent, String>> {
    match item {
        Ok(SSE::Event(ev)) => Some(Ok(WireEvent {
            event_type: ev.event_type,
            data: ev.data,
        })),
        Ok(SSE::Comment(_)) => None,
        Ok(SSE::Connected(_)) => {
            debug!("Event stream connected");
            None
        }
        Err(e) => Some(Err(e.to_string())),
    }
}

/// Run an exchange over a stream of wire events and return its final state.
///
/// The open guard is released before the terminal update is delivered, so a
/// consumer that reacts to `Finalized` or `Error` can start the next exchange
/// right away.
async fn run_exchange<S>(
    events: S,
    mut exchange: Exchange,
    session: Arc<Mutex<SessionState>>,
    tx: mpsc::Sender<ExchangeUpdate>,
    guard: OpenGuard,
) -> Exchange
where
    S: Stream<Item = Result<WireEvent, String>> + Unpin,
{
    let terminal = drive(events, &mut exchange, &session, &tx).await;
    drop(guard);

    if let Some(update) = terminal {
        if tx.send(update).await.is_err() {
            debug!("Update receiver dropped before the terminal update");
        }
    }
    exchange
}

/// Feed events to the exchange until it closes. Non-terminal updates are
/// sent from here; the terminal one is returned to the caller.
async fn drive<S>(
    mut events: S,
    exchange: &mut Exchange,
    session: &Mutex<SessionState>,
    tx: &mpsc::Sender<ExchangeUpdate>,
) -> Option<ExchangeUpdate>
where
    S: Stream<Item = Result<WireEvent, String>> + Unpin,
{
    while let Some(item) = events.next().await {
        let wire = match item {
            Ok(wire) => wire,
            Err(error) => {
                warn!(error = %error, "Event stream failed");
                return exchange.fail(ChatError::Transport(error).to_string());
            }
        };

        let event = match StreamEvent::parse(&wire.event_type, &wire.data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event_type = %wire.event_type, "Ignoring unknown event type");
                continue;
            }
            Err(e) => {
                warn!(
                    event_type = %wire.event_type,
                    data = %truncate_with_ellipsis(&wire.data, 200),
                    error = %e,
                    "Skipping malformed event"
                );
                continue;
            }
        };

        let update = exchange.apply(event, &mut lock(session));
        if !exchange.is_open() {
            return update;
        }

        if let Some(update) = update {
            if tx.send(update).await.is_err() {
                debug!("Update receiver dropped, abandoning exchange");
                exchange.fail("update receiver dropped");
                return None;
            }
        }
    }

    warn!("Event stream closed before the end event");
    exchange.fail(ChatError::StreamClosed.to_string())
}

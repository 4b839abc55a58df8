//! Integration tests for the streaming exchange.
//!
//! A wiremock server plays the `/ask/stream` endpoint; the client talks to it
//! over a real event-stream connection.

use std::time::Duration;

use rag_chat::render::strip_ansi;
use rag_chat::{
    present, ChatClient, ChatError, Document, ExchangeStatus, ExchangeUpdate, RenderMode,
    TerminalPresenter,
};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Encode `(event, data)` pairs as an event-stream body. An empty event name
/// produces an unnamed (default) event.
fn sse_body(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(name, data)| {
            if name.is_empty() {
                format!("data: {data}\n\n")
            } else {
                format!("event: {name}\ndata: {data}\n\n")
            }
        })
        .collect()
}

fn sse_response(events: &[(&str, &str)]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(events), "text/event-stream")
}

fn client_for(server: &MockServer) -> ChatClient {
    ChatClient::with_endpoint(server.uri())
        .unwrap()
        .with_token("secret")
}

// ─────────────────────────────────────────────────────────────────────────────
// Single exchange
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hello_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .and(query_param("query", "say hello"))
        .and(query_param_is_missing("history"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(sse_response(&[
            ("start", r#"{"session_id": "abc"}"#),
            ("", r#""Hel""#),
            ("", r#""lo""#),
            ("end", "{}"),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = client.start_exchange("  say hello ").unwrap();
    let (updates, exchange) = handle.collect().await.unwrap();

    assert_eq!(
        updates,
        vec![
            ExchangeUpdate::UserMessage("say hello".into()),
            ExchangeUpdate::PartialText("Hel".into()),
            ExchangeUpdate::PartialText("Hello".into()),
            ExchangeUpdate::Finalized("Hello".into()),
        ]
    );
    assert_eq!(exchange.status(), ExchangeStatus::Ended);
    assert_eq!(client.session().session_id(), Some("abc"));
    assert!(!client.is_exchange_open());
}

#[tokio::test]
async fn test_side_channels_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[
            ("start", "{}"),
            ("rewritten_query", r#""aperturedb video clips""#),
            ("message", r#""Use ""#),
            ("documents", r#"[{"url": "http://x", "text": "t1"}]"#),
            ("message", r#""FindClip.""#),
            ("history", r#""h-1""#),
            ("end", r#"{"duration": 0.5, "parts": 2}"#),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (updates, exchange) = client
        .start_exchange("clips?")
        .unwrap()
        .collect()
        .await
        .unwrap();

    let docs = vec![Document {
        url: "http://x".into(),
        text: "t1".into(),
    }];
    assert_eq!(
        updates,
        vec![
            ExchangeUpdate::UserMessage("clips?".into()),
            ExchangeUpdate::RewrittenQuery("aperturedb video clips".into()),
            ExchangeUpdate::PartialText("Use ".into()),
            ExchangeUpdate::Documents(docs.clone()),
            ExchangeUpdate::PartialText("Use FindClip.".into()),
            ExchangeUpdate::HistoryUpdated("h-1".into()),
            ExchangeUpdate::Finalized("Use FindClip.".into()),
        ]
    );
    assert_eq!(exchange.documents(), docs.as_slice());
    assert_eq!(exchange.rewritten_query(), Some("aperturedb video clips"));
    assert_eq!(exchange.summary().and_then(|s| s.parts), Some(2));
    assert_eq!(client.session().session_id(), None);
    assert_eq!(client.session().history(), Some("h-1"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Continuity across exchanges
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_threads_into_next_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .and(query_param("query", "first question"))
        .and(query_param_is_missing("history"))
        .respond_with(sse_response(&[
            ("", r#""one""#),
            ("history", r#""h-old""#),
            ("history", r#""user: first question""#),
            ("end", "{}"),
        ]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .and(query_param("query", "second question"))
        .and(query_param("history", "user: first question"))
        .respond_with(sse_response(&[("", r#""two""#), ("end", "{}")]))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let first = client
        .start_exchange("first question")
        .unwrap()
        .finish()
        .await
        .unwrap();
    assert_eq!(first.status(), ExchangeStatus::Ended);

    let second = client
        .start_exchange("second question")
        .unwrap()
        .finish()
        .await
        .unwrap();
    assert_eq!(second.status(), ExchangeStatus::Ended);
    assert_eq!(second.accumulated_text(), "two");
}

#[tokio::test]
async fn test_next_exchange_can_start_on_finalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[("", r#""ok""#), ("end", "{}")]))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut handle = client.start_exchange("one").unwrap();
    while let Some(update) = handle.next_update().await {
        if matches!(update, ExchangeUpdate::Finalized(_)) {
            break;
        }
    }

    let second = client.start_exchange("two").unwrap();
    let (_, exchange) = second.collect().await.unwrap();
    assert_eq!(exchange.accumulated_text(), "ok");
    handle.finish().await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Guards and input errors
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_overlapping_exchange_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(
            sse_response(&[("", r#""slow""#), ("end", "{}")])
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let handle = client.start_exchange("first").unwrap();
    assert!(client.is_exchange_open());

    assert!(matches!(
        client.start_exchange("second"),
        Err(ChatError::ExchangeInProgress)
    ));

    let exchange = handle.finish().await.unwrap();
    assert_eq!(exchange.accumulated_text(), "slow");
    assert!(!client.is_exchange_open());
}

#[tokio::test]
async fn test_empty_query_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for query in ["", "   ", "\n\t"] {
        assert!(matches!(
            client.start_exchange(query),
            Err(ChatError::EmptyQuery)
        ));
    }
    assert!(!client.is_exchange_open());
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (updates, exchange) = client
        .start_exchange("boom")
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], ExchangeUpdate::UserMessage("boom".into()));
    assert!(matches!(updates[1], ExchangeUpdate::Error(_)));
    assert_eq!(exchange.status(), ExchangeStatus::Errored);
    assert!(!client.is_exchange_open());
}

#[tokio::test]
async fn test_unreachable_server_still_shows_user_message() {
    // Port 1 is never listening; the connection is refused.
    let client = ChatClient::with_endpoint("http://127.0.0.1:1").unwrap();
    let (updates, exchange) = client
        .start_exchange("anyone there?")
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(updates[0], ExchangeUpdate::UserMessage("anyone there?".into()));
    assert!(matches!(updates.last(), Some(ExchangeUpdate::Error(_))));
    assert_eq!(updates.len(), 2);
    assert_eq!(exchange.status(), ExchangeStatus::Errored);
}

#[tokio::test]
async fn test_stream_without_end_keeps_partial_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[("", r#""half an ""#), ("", r#""answer""#)]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (updates, exchange) = client
        .start_exchange("cut off")
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert!(!updates
        .iter()
        .any(|u| matches!(u, ExchangeUpdate::Finalized(_))));
    assert!(matches!(updates.last(), Some(ExchangeUpdate::Error(_))));
    assert_eq!(exchange.accumulated_text(), "half an answer");
    assert_eq!(exchange.status(), ExchangeStatus::Errored);
}

#[tokio::test]
async fn test_malformed_fragment_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[
            ("", r#""a""#),
            ("", "raw, not json"),
            ("", r#""b""#),
            ("end", "{}"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let exchange = client
        .start_exchange("q")
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(exchange.status(), ExchangeStatus::Ended);
    assert_eq!(exchange.accumulated_text(), "ab");
}

#[tokio::test]
async fn test_terminal_presenter_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[
            ("start", r#"{"session_id": "s-1"}"#),
            ("", r#""**Use** ""#),
            ("", r#""FindClip.""#),
            ("documents", r#"[{"url": "http://docs/clip", "text": "FindClip finds clips"}]"#),
            ("end", "{}"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut presenter = TerminalPresenter::new(Vec::new(), RenderMode::Rich);
    let exchange = present(client.start_exchange("clips").unwrap(), &mut presenter)
        .await
        .unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::Ended);

    let output = strip_ansi(&String::from_utf8(presenter.into_inner()).unwrap());
    assert!(output.starts_with("You: clips\nBot: **Use** FindClip."));
    assert!(output.contains("Sources:\n  [1] http://docs/clip - FindClip finds clips"));
    assert!(output.ends_with("Use FindClip.\n"));
}

#[tokio::test]
async fn test_slow_connection_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(
            sse_response(&[("", r#""late""#), ("end", "{}")]).set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).with_connect_timeout(Duration::from_millis(200));
    let (updates, exchange) = client
        .start_exchange("anyone?")
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(
        updates,
        vec![
            ExchangeUpdate::UserMessage("anyone?".into()),
            ExchangeUpdate::Error("transport error: connection timed out after 200ms".into()),
        ]
    );
    assert_eq!(exchange.status(), ExchangeStatus::Errored);
    assert_eq!(exchange.accumulated_text(), "");
    assert!(!client.is_exchange_open());
}

#[tokio::test]
async fn test_dropped_handle_releases_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask/stream"))
        .respond_with(sse_response(&[
            ("", r#""one""#),
            ("", r#""two""#),
            ("end", "{}"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    drop(client.start_exchange("nobody listens").unwrap());

    tokio::time::timeout(Duration::from_secs(5), async {
        while client.is_exchange_open() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("exchange should be released after its handle is dropped");

    let exchange = client
        .start_exchange("second try")
        .unwrap()
        .finish()
        .await
        .unwrap();
    assert_eq!(exchange.status(), ExchangeStatus::Ended);
    assert_eq!(exchange.accumulated_text(), "onetwo");
}

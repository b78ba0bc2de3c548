//! Failover and retry behaviour of the client against a scripted transport.

mod common;

use common::{Reply, ScriptedTransport, client, connection, options};
use monkdb::{CancellationToken, Client, MonkError, SqlArgs, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const A: &str = "http://a:4200";
const B: &str = "http://b:4200";
const C: &str = "http://c:4200";

fn answer() -> serde_json::Value {
    json!({
        "cols": ["answer"],
        "col_types": [9],
        "rows": [[42]],
        "rowcount": 1,
        "duration": 0.3
    })
}

#[tokio::test(start_paused = true)]
async fn test_fails_over_to_second_server() {
    let transport = ScriptedTransport::new([
        Reply::Raw(503, "Service Unavailable"),
        Reply::Json(200, answer()),
    ]);
    let conn = connection(&[A, B], transport.clone());
    let mut cursor = conn.cursor().unwrap();

    let start = Instant::now();
    cursor.execute("SELECT 42 AS answer", &[]).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(transport.endpoints(), vec![A, B]);
    assert!(elapsed >= Duration::from_millis(100), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(200), "{:?}", elapsed);

    assert!(cursor.advance());
    assert_eq!(cursor.get(0).unwrap(), &Value::Int(42));
    assert_eq!(cursor.rowcount(), 1);
    assert!(!cursor.advance());

    let snap = conn.client().pool().snapshot().await;
    assert_eq!(snap.inactive.len(), 1);
    assert_eq!(snap.inactive[0].url(), A);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_last_error() {
    let transport = ScriptedTransport::new([
        Reply::Raw(503, ""),
        Reply::Fail("connection refused"),
        Reply::Raw(502, ""),
    ]);
    let client = client(&[A, B, C], transport.clone());

    let start = Instant::now();
    let err = client.sql("SELECT 1", SqlArgs::None).await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(transport.call_count(), 3);
    // The rotation index survives the first shrink, so C comes before B.
    assert_eq!(transport.endpoints(), vec![A, C, B]);
    match &err {
        MonkError::Connection { message, .. } => {
            assert!(message.starts_with("All servers failed. Last error:"), "{}", message);
            assert!(message.contains("502"), "{}", message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // 100ms + 200ms, and no wait after the final attempt.
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(700), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_single_server_is_revived() {
    let transport = ScriptedTransport::new([
        Reply::Fail("connection reset"),
        Reply::Json(200, answer()),
    ]);
    let client = client(&[A], transport.clone());

    let batch = client.sql("SELECT 42", SqlArgs::None).await.unwrap();
    assert_eq!(transport.endpoints(), vec![A, A]);
    assert_eq!(batch.rows, vec![vec![json!(42)]]);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let transport = ScriptedTransport::new([Reply::Json(
        400,
        json!({
            "error": {
                "message": "SQLParseException[line 1:1: mismatched input 'SELEC']",
                "code": 4000
            },
            "error_trace": "io.monkdb.sql.parser..."
        }),
    )]);
    let client = client(&[A, B], transport.clone());

    let err = client.sql("SELEC 1", SqlArgs::None).await.unwrap_err();
    assert!(matches!(err, MonkError::Programming { .. }));
    assert_eq!(err.trace(), Some("io.monkdb.sql.parser..."));
    assert_eq!(transport.call_count(), 1);
    assert!(client.pool().snapshot().await.inactive.is_empty());
}

#[tokio::test]
async fn test_duplicate_key_is_integrity_error() {
    let transport = ScriptedTransport::new([Reply::Json(
        409,
        json!({
            "error": {
                "message": "A document with the same primary key exists already",
                "code": 4091
            }
        }),
    )]);
    let client = client(&[A], transport.clone());

    let err = client
        .sql("INSERT INTO t (id) VALUES (?)", vec![json!(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, MonkError::Integrity { .. }));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_is_retried() {
    let transport = ScriptedTransport::new([
        Reply::Raw(200, "<html>proxy error</html>"),
        Reply::Json(200, answer()),
    ]);
    let client = client(&[A, B], transport.clone());

    client.sql("SELECT 42", SqlArgs::None).await.unwrap();
    assert_eq!(transport.endpoints(), vec![A, B]);
}

#[tokio::test]
async fn test_unknown_type_code_is_terminal() {
    let transport = ScriptedTransport::new([Reply::Json(
        200,
        json!({"cols": ["x"], "col_types": [999], "rows": [[1]], "rowcount": 1}),
    )]);
    let client = client(&[A, B], transport.clone());

    let err = client.sql("SELECT x FROM t", SqlArgs::None).await.unwrap_err();
    assert!(matches!(err, MonkError::Interface(_)));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_request_body_and_path() {
    let transport = ScriptedTransport::new([Reply::Json(200, answer())]);
    let client = client(&[A], transport.clone());

    client
        .sql("SELECT * FROM users WHERE id = ?", vec![json!(7)])
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, monkdb::transport::Method::POST);
    assert_eq!(requests[0].path, "/_sql?types=true");
    let body: serde_json::Value =
        serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"stmt": "SELECT * FROM users WHERE id = ?", "args": [7]}));
}

#[tokio::test]
async fn test_empty_statement_never_hits_the_network() {
    let transport = ScriptedTransport::new([]);
    let client = client(&[A], transport.clone());

    let err = client.sql("   ", SqlArgs::None).await.unwrap_err();
    assert!(err.is_programming_error());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_request() {
    let transport = ScriptedTransport::new([Reply::Hang]);
    let client = client(&[A, B], transport.clone());
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    let err = client
        .sql_cancellable("SELECT sleep(10000)", SqlArgs::None, &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, MonkError::Cancelled));
    assert_eq!(transport.call_count(), 1);
    assert!(client.pool().snapshot().await.inactive.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let transport = ScriptedTransport::new([Reply::Raw(503, ""), Reply::Json(200, answer())]);
    let client = client(&[A, B], transport.clone());
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        })
    };

    let err = client
        .sql_cancellable("SELECT 42", SqlArgs::None, &token)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, MonkError::Cancelled));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_already_cancelled_makes_no_calls() {
    let transport = ScriptedTransport::new([Reply::Json(200, answer())]);
    let client = client(&[A], transport.clone());
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .sql_cancellable("SELECT 42", SqlArgs::None, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, MonkError::Cancelled));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_closed_client_rejects_requests() {
    let transport = ScriptedTransport::new([]);
    let client = client(&[A], transport.clone());
    client.close().await;
    client.close().await;

    let err = client.sql("SELECT 1", SqlArgs::None).await.unwrap_err();
    assert!(matches!(err, MonkError::Programming { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_options_rejected_for_any_transport() {
    let transport = ScriptedTransport::new([]);
    let err = Client::with_transport(&options(&[A]).retries(0), transport.clone()).unwrap_err();
    assert!(matches!(err, MonkError::Config(_)));

    let err = Client::with_transport(&options(&[]), transport.clone()).unwrap_err();
    assert!(matches!(err, MonkError::Config(_)));

    let err = Client::with_transport(&options(&["  "]), transport.clone()).unwrap_err();
    assert!(matches!(err, MonkError::Config(_)));
    assert_eq!(transport.call_count(), 0);
}

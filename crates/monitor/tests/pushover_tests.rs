//! Integration tests for the Pushover notification sink.
//!
//! Each test starts a throwaway HTTP server on a random local port standing
//! in for the Pushover messages endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use laundry_monitor::config::PushoverConfig;
use laundry_monitor::notify::{NotificationSink, PushoverSink, SendError};

type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serve a fake messages endpoint answering with `status` and `body`.
///
/// Returns the endpoint URL and the captured request forms.
async fn spawn_endpoint(status: StatusCode, body: Value) -> (String, Captured) {
    let captured: Captured = Arc::default();

    let app = Router::new()
        .route(
            "/1/messages.json",
            post(
                move |State(captured): State<Captured>,
                      Form(form): Form<HashMap<String, String>>| {
                    let body = body.clone();
                    async move {
                        captured.lock().unwrap().push(form);
                        (status, Json(body))
                    }
                },
            ),
        )
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/1/messages.json"), captured)
}

fn make_sink(api_url: String) -> PushoverSink {
    PushoverSink::new(PushoverConfig {
        token: "app-token".to_string(),
        user: "user-key".to_string(),
        sound: "echo".to_string(),
        api_url,
    })
    .expect("client should build")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// The sink posts the credentials, message, label and sound as a form.
#[tokio::test]
async fn posts_form_to_messages_endpoint() {
    let (url, captured) =
        spawn_endpoint(StatusCode::OK, json!({"status": 1, "request": "abc"})).await;
    let sink = make_sink(url);

    sink.send("Washer has finished", "Washer")
        .await
        .expect("delivery should succeed");

    let forms = captured.lock().unwrap().clone();
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form["token"], "app-token");
    assert_eq!(form["user"], "user-key");
    assert_eq!(form["message"], "Washer has finished");
    assert_eq!(form["title"], "Washer");
    assert_eq!(form["sound"], "echo");
}

/// A rejected request surfaces the service's error detail.
#[tokio::test]
async fn rejected_request_reports_errors() {
    let (url, _captured) = spawn_endpoint(
        StatusCode::BAD_REQUEST,
        json!({"status": 0, "errors": ["application token is invalid"]}),
    )
    .await;
    let sink = make_sink(url);

    let err = sink.send("Dryer has finished", "Dryer").await.unwrap_err();

    assert_matches!(
        &err,
        SendError::Rejected { status: 400, detail } if detail == "application token is invalid"
    );
}

/// An unreachable endpoint is a request error, not a panic.
#[tokio::test]
async fn unreachable_endpoint_is_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = make_sink(format!("http://{addr}/1/messages.json"));
    let err = sink.send("Washer has finished", "Washer").await.unwrap_err();

    assert_matches!(err, SendError::Request(_));
}

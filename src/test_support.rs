//! Fake upstream helpers shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Form, Query};
use axum::http::header::CONTENT_TYPE;
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose;
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// Serves `router` on an ephemeral local port, returning its base URL.
pub(crate) async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake upstream");
    let addr = listener.local_addr().expect("fake upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}/")
}

/// A base URL nothing is listening on.
pub(crate) async fn dead_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let addr = listener.local_addr().expect("throwaway addr");
    drop(listener);
    format!("http://{addr}/")
}

/// Encodes chunks as a server-sent-event body.
pub(crate) fn sse_body(chunks: &[Value]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\r\n\r\n"))
        .collect()
}

pub(crate) fn gemini_text_chunk(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

pub(crate) fn gemini_image_chunk(bytes: &[u8]) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{
        "inlineData": {
            "mimeType": "image/png",
            "data": general_purpose::STANDARD.encode(bytes)
        }
    }]}}]})
}

/// Gemini stand-in that answers every call with `events`, counting calls.
pub(crate) fn gemini_upstream(events: String, calls: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/v1beta/models/{model}",
        post(move || {
            let events = events.clone();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                ([(CONTENT_TYPE, "text/event-stream")], events)
            }
        }),
    )
}

/// Fields received by [`nano_upstream`], one map per call.
pub(crate) type NanoCalls = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Secondary API stand-in on `/nano`, replying `reply` to GET and POST.
pub(crate) fn nano_upstream(reply: Vec<u8>, calls: NanoCalls) -> Router {
    let get_reply = reply.clone();
    let get_calls = calls.clone();
    Router::new().route(
        "/nano",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let reply = get_reply.clone();
            let calls = get_calls.clone();
            async move {
                calls.lock().await.push(query);
                reply
            }
        })
        .post(move |Form(form): Form<HashMap<String, String>>| {
            let reply = reply.clone();
            let calls = calls.clone();
            async move {
                calls.lock().await.push(form);
                reply
            }
        }),
    )
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::Form;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use axum::routing::post;
use banana_mixer::cli::CliOptions;
use banana_mixer::config::GeneratorConfig;
use banana_mixer::constants::COMBINE_PROMPT;
use banana_mixer::providers::FailureKind;
use banana_mixer::web::{AppState, build_app};
use base64::Engine;
use base64::engine::general_purpose;
use clap::Parser;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

const BOUNDARY: &str = "flow-boundary";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}/")
}

async fn unused_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}/")
}

fn config(root: &std::path::Path, gemini: &str, nano: &str) -> GeneratorConfig {
    let root = root.display().to_string();
    let options = CliOptions::parse_from([
        "banana-mixer".to_string(),
        "--gemini-api-key".to_string(),
        "flow-test-key".to_string(),
        "--gemini-api-base".to_string(),
        gemini.to_string(),
        "--nano-api-url".to_string(),
        format!("{nano}nano"),
        "--upload-dir".to_string(),
        format!("{root}/uploads"),
        "--output-dir".to_string(),
        format!("{root}/output"),
        "--static-dir".to_string(),
        format!("{root}/static"),
        "--request-timeout".to_string(),
        "5".to_string(),
    ]);
    GeneratorConfig::try_from(&options).expect("config")
}

async fn app(config: GeneratorConfig) -> Router {
    config.ensure_dirs().await.expect("dirs");
    build_app(AppState::new(config).expect("state"))
}

fn generate_request(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (filename, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json")
}

async fn file_count(dir: &std::path::Path) -> usize {
    let mut entries = tokio::fs::read_dir(dir).await.expect("read dir");
    let mut count = 0;
    while entries.next_entry().await.expect("entry").is_some() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn prompt_only_gemini_generation_is_downloadable() {
    let chunk = json!({"candidates": [{"content": {"parts": [{
        "inlineData": {"mimeType": "image/png", "data": general_purpose::STANDARD.encode(b"PNGDATA")}
    }]}}]});
    let events = format!("data: {chunk}\r\n\r\n");
    let gemini = serve(Router::new().route(
        "/v1beta/models/{model}",
        post(move || {
            let events = events.clone();
            async move { ([(CONTENT_TYPE, "text/event-stream")], events) }
        }),
    ))
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), &gemini, &unused_address().await);
    let output_dir = config.output_dir.clone();
    let app = app(config).await;

    let response = app
        .clone()
        .oneshot(generate_request(
            &[("prompt", "a red balloon"), ("api_choice", "gemini")],
            &[],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    let filename = json["filename"].as_str().expect("filename");
    assert!(filename.starts_with("generated_") && filename.ends_with(".png"));
    assert_eq!(file_count(&output_dir).await, 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri(json["image_url"].as_str().expect("image url"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"PNGDATA");
}

#[tokio::test]
async fn images_without_prompt_use_combine_instruction() {
    let seen: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
    let recorder = seen.clone();
    let nano = serve(Router::new().route(
        "/nano",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().await.push(form);
                json!({"image": general_purpose::STANDARD.encode(b"\x89PNG\r\n\x1a\nmixed")})
                    .to_string()
            }
        }),
    ))
    .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(config(dir.path(), &unused_address().await, &nano)).await;

    let response = app
        .oneshot(generate_request(
            &[("prompt", ""), ("api_choice", "nano")],
            &[("cat.jpg", &b"\xff\xd8\xffcat"[..])],
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["success"], true, "{json}");
    assert!(json["filename"].as_str().expect("filename").starts_with("nano_"));

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get("text").map(String::as_str), Some(COMBINE_PROMPT));
    assert!(
        seen[0]
            .get("links")
            .is_some_and(|links| links.ends_with("_cat.jpg"))
    );
}

#[tokio::test]
async fn unreachable_secondary_api_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), &unused_address().await, &unused_address().await);
    let output_dir = config.output_dir.clone();
    let app = app(config).await;

    let response = app
        .oneshot(generate_request(&[("prompt", "x"), ("api_choice", "nano")], &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], FailureKind::UpstreamUnavailable.message());
    assert_eq!(file_count(&output_dir).await, 0);
}

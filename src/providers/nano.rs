//! Secondary URL-based image API.
//!
//! Images are passed by public link rather than inline. The response is
//! either `{"image": "<base64>"}` or the raw image bytes, and there's no way
//! to tell which ahead of time.

use base64::Engine;
use base64::engine::general_purpose;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use url::Url;

use super::{FailureKind, GeneratedImage, GenerationFailure, GenerationResult};
use crate::constants::DEFAULT_OUTPUT_EXTENSION;

#[derive(Deserialize, Debug)]
struct NanoImageResponse {
    image: String,
}

/// Client for the secondary image API.
#[derive(Clone, Debug)]
pub struct NanoClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl NanoClient {
    /// Client talking to `endpoint`.
    pub fn new(endpoint: Url, client: reqwest::Client) -> Self {
        Self { client, endpoint }
    }

    /// Generates an image from `prompt` and the images at `image_urls`.
    ///
    /// With links this is a form POST of `text` and comma-joined `links`,
    /// without them a GET with `text` in the query string.
    #[instrument(skip_all, fields(links = image_urls.len()))]
    pub async fn generate(&self, prompt: &str, image_urls: &[Url]) -> GenerationResult {
        let request = if image_urls.is_empty() {
            self.client
                .get(self.endpoint.clone())
                .query(&[("text", prompt)])
        } else {
            let links = image_urls
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>()
                .join(",");
            self.client
                .post(self.endpoint.clone())
                .form(&[("text", prompt), ("links", links.as_str())])
        };

        let response = request.send().await.map_err(|err| {
            error!("Request to nano API failed: {}", err.without_url());
            GenerationFailure::new(FailureKind::UpstreamUnavailable)
        })?;
        let status = response.status();
        if !status.is_success() {
            error!("Nano API returned {status}");
            return Err(GenerationFailure::new(FailureKind::UpstreamUnavailable));
        }
        let body = response.bytes().await.map_err(|err| {
            error!("Failed reading nano API body: {}", err.without_url());
            GenerationFailure::new(FailureKind::UpstreamUnavailable)
        })?;

        let bytes = decode_image_body(&body);
        if bytes.is_empty() {
            warn!("Nano API returned an empty body");
            return Err(GenerationFailure::new(FailureKind::GenerationError));
        }
        let extension = sniff_extension(&bytes);
        info!("Nano API returned {} bytes ({extension})", bytes.len());
        Ok(GeneratedImage { bytes, extension })
    }
}

/// Pulls image bytes out of a response body: the base64 `image` field when
/// the body is JSON carrying one, otherwise the body itself.
pub fn decode_image_body(body: &[u8]) -> Vec<u8> {
    serde_json::from_slice::<NanoImageResponse>(body)
        .ok()
        .and_then(|parsed| general_purpose::STANDARD.decode(parsed.image).ok())
        .unwrap_or_else(|| body.to_vec())
}

/// File extension matching the image's magic bytes, `png` if unknown.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_OUTPUT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::test_support::{dead_upstream, spawn_upstream};

    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Form, Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;
    use tokio::sync::Mutex;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    #[derive(Clone, Default)]
    struct Seen {
        method: Arc<Mutex<Option<&'static str>>>,
        fields: Arc<Mutex<HashMap<String, String>>>,
    }

    fn upstream(seen: Seen, reply: Vec<u8>) -> Router {
        let get_reply = reply.clone();
        Router::new()
            .route(
                "/api/generate",
                get(
                    move |State(seen): State<Seen>,
                          Query(query): Query<HashMap<String, String>>| {
                        let reply = get_reply.clone();
                        async move {
                            *seen.method.lock().await = Some("GET");
                            *seen.fields.lock().await = query;
                            reply
                        }
                    },
                )
                .post(
                    move |State(seen): State<Seen>,
                          Form(form): Form<HashMap<String, String>>| {
                        let reply = reply.clone();
                        async move {
                            *seen.method.lock().await = Some("POST");
                            *seen.fields.lock().await = form;
                            reply
                        }
                    },
                ),
            )
            .with_state(seen)
    }

    async fn client_for(base: &str) -> NanoClient {
        let endpoint = Url::parse(base)
            .and_then(|base| base.join("api/generate"))
            .expect("endpoint");
        NanoClient::new(endpoint, reqwest::Client::new())
    }

    fn url(value: &str) -> Url {
        Url::parse(value).expect("url")
    }

    #[test]
    fn json_image_field_is_base64_decoded() {
        let encoded = general_purpose::STANDARD.encode(PNG_MAGIC);
        let body = json!({"image": encoded}).to_string();
        assert_eq!(
            decode_image_body(body.as_bytes()),
            general_purpose::STANDARD.decode(&encoded).expect("decode")
        );
    }

    #[test]
    fn non_json_body_is_used_verbatim() {
        assert_eq!(decode_image_body(JPEG_MAGIC), JPEG_MAGIC);
        assert_eq!(decode_image_body(b"not json at all"), b"not json at all");
    }

    #[test]
    fn unusable_json_falls_back_to_raw_body() {
        for body in [
            r#"{"error": "busy"}"#,
            r#"{"image": "***not base64***"}"#,
            r#"{"image": 42}"#,
        ] {
            assert_eq!(decode_image_body(body.as_bytes()), body.as_bytes());
        }
    }

    #[test]
    fn extensions_follow_magic_bytes() {
        assert_eq!(sniff_extension(PNG_MAGIC), "png");
        assert_eq!(sniff_extension(JPEG_MAGIC), "jpg");
        assert_eq!(sniff_extension(b"mystery"), "png");
    }

    #[tokio::test]
    async fn no_links_sends_get_with_text_query() {
        let seen = Seen::default();
        let base = spawn_upstream(upstream(seen.clone(), JPEG_MAGIC.to_vec())).await;
        let client = client_for(&base).await;

        let image = client
            .generate("a red balloon", &[])
            .await
            .expect("image returned");
        assert_eq!(image.bytes, JPEG_MAGIC);
        assert_eq!(image.extension, "jpg");
        assert_eq!(*seen.method.lock().await, Some("GET"));
        let fields = seen.fields.lock().await;
        assert_eq!(fields.get("text").map(String::as_str), Some("a red balloon"));
        assert!(!fields.contains_key("links"));
    }

    #[tokio::test]
    async fn links_send_form_post() {
        let seen = Seen::default();
        let encoded = general_purpose::STANDARD.encode(PNG_MAGIC);
        let reply = json!({"image": encoded}).to_string().into_bytes();
        let base = spawn_upstream(upstream(seen.clone(), reply)).await;
        let client = client_for(&base).await;

        let links = [
            url("http://localhost:5000/static/uploads/a_cat.jpg"),
            url("http://localhost:5000/static/uploads/b_dog.png"),
        ];
        let image = client
            .generate("mix these", &links)
            .await
            .expect("image returned");
        assert_eq!(image.bytes, PNG_MAGIC);
        assert_eq!(image.extension, "png");

        assert_eq!(*seen.method.lock().await, Some("POST"));
        let fields = seen.fields.lock().await;
        assert_eq!(fields.get("text").map(String::as_str), Some("mix these"));
        assert_eq!(
            fields.get("links").map(String::as_str),
            Some(
                "http://localhost:5000/static/uploads/a_cat.jpg,http://localhost:5000/static/uploads/b_dog.png"
            )
        );
    }

    #[tokio::test]
    async fn connection_failure_is_upstream_unavailable() {
        let client = client_for(&dead_upstream().await).await;
        let failure = client.generate("x", &[]).await.expect_err("no upstream");
        assert_eq!(failure.kind, FailureKind::UpstreamUnavailable);
        assert_eq!(failure.message, FailureKind::UpstreamUnavailable.message());
    }

    #[tokio::test]
    async fn unanswered_request_times_out_as_upstream_unavailable() {
        let router = Router::new().route(
            "/api/generate",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                JPEG_MAGIC.to_vec()
            }),
        );
        let base = spawn_upstream(router).await;
        let mut config = GeneratorConfig::for_tests(Path::new("."), &dead_upstream().await, None);
        config.request_timeout = Duration::from_secs(1);
        let endpoint = url(&base).join("api/generate").expect("endpoint");
        let client = NanoClient::new(endpoint, config.http_client().expect("http client"));

        let started = tokio::time::Instant::now();
        let failure = client.generate("x", &[]).await.expect_err("timed out");
        assert_eq!(failure.kind, FailureKind::UpstreamUnavailable);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn error_status_is_upstream_unavailable() {
        let router = Router::new().route(
            "/api/generate",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let client = client_for(&spawn_upstream(router).await).await;
        let failure = client.generate("x", &[]).await.expect_err("bad status");
        assert_eq!(failure.kind, FailureKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn empty_body_is_generation_error() {
        let client =
            client_for(&spawn_upstream(upstream(Seen::default(), Vec::new())).await).await;
        let failure = client.generate("x", &[]).await.expect_err("empty body");
        assert_eq!(failure.kind, FailureKind::GenerationError);
    }
}

//! Gemini `streamGenerateContent` adapter.
//!
//! Sends the prompt and every staged image as one multi-part request and reads
//! the server-sent-event stream until the first chunk carrying inline image
//! data shows up. Nothing after that chunk is read.

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use base64::Engine;
use base64::engine::general_purpose;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::{FailureKind, GeneratedImage, GenerationFailure, GenerationResult, classify_error};
use crate::config::GeneratorConfig;
use crate::constants::{DEFAULT_OUTPUT_EXTENSION, GEMINI_API_KEY_HEADER, GEMINI_INLINE_MIME_TYPE};

// -----------------------------
// Request
// -----------------------------

/// Request body for POST /v1beta/models/{model}:streamGenerateContent
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: RequestInlineData,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RequestInlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
}

// -----------------------------
// Streamed response
// -----------------------------

/// One `data:` payload from the stream. Every level is optional, chunks
/// carrying only usage metadata or safety info are normal.
#[derive(Deserialize, Debug, Default)]
struct StreamChunk {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

impl StreamChunk {
    fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    fn first_part(&self) -> Option<&CandidatePart> {
        self.candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?
            .first()
    }

    /// Base64 data of the first part, if it's inline and non-empty.
    fn first_inline_data(&self) -> Option<&InlineData> {
        let inline = self.first_part()?.inline_data.as_ref()?;
        match inline.data.as_deref() {
            Some(data) if !data.is_empty() => Some(inline),
            _ => None,
        }
    }

    fn first_text(&self) -> Option<&str> {
        self.first_part()?.text.as_deref()
    }
}

// -----------------------------
// Client
// -----------------------------

/// Client for the Gemini image model.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Builds the client from config, resolving the streaming endpoint.
    pub fn new(config: &GeneratorConfig, client: reqwest::Client) -> Result<Self, url::ParseError> {
        Self::from_parts(
            client,
            &config.gemini_api_base,
            &config.gemini_model,
            &config.gemini_api_key,
        )
    }

    /// Client for `model` under `api_base`, which must end in `/`.
    pub fn from_parts(
        client: reqwest::Client,
        api_base: &Url,
        model: &str,
        api_key: &str,
    ) -> Result<Self, url::ParseError> {
        let mut endpoint =
            api_base.join(&format!("v1beta/models/{model}:streamGenerateContent"))?;
        endpoint.set_query(Some("alt=sse"));
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Generates an image from `prompt`, mixing in the images at `image_paths`.
    ///
    /// Every image goes up tagged as `image/jpeg` whatever its real format.
    #[instrument(skip_all, fields(model = %self.model, images = image_paths.len()))]
    pub async fn generate(&self, prompt: &str, image_paths: &[PathBuf]) -> GenerationResult {
        match self.first_inline_image(prompt, image_paths).await {
            Ok(Some(bytes)) => {
                info!("Gemini returned {} bytes of image data", bytes.len());
                Ok(GeneratedImage {
                    bytes,
                    extension: DEFAULT_OUTPUT_EXTENSION,
                })
            }
            Ok(None) => {
                warn!("Gemini stream ended without inline image data");
                Err(GenerationFailure::new(FailureKind::GenerationError))
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!("Error generating image: {message}");
                Err(classify_error(&message).into())
            }
        }
    }

    async fn first_inline_image(
        &self,
        prompt: &str,
        image_paths: &[PathBuf],
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let mut parts = Vec::with_capacity(image_paths.len() + 1);
        parts.push(RequestPart::Text { text: prompt });
        for path in image_paths {
            let bytes = tokio::fs::read(path)
                .await
                .context("Failed to read staged image")?;
            parts.push(RequestPart::InlineData {
                inline_data: RequestInlineData {
                    mime_type: GEMINI_INLINE_MIME_TYPE,
                    data: general_purpose::STANDARD.encode(bytes),
                },
            });
        }
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(GEMINI_API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Request to streamGenerateContent failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {status}: {body}"));
        }

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(stream_error)?;
            if event.data.is_empty() {
                continue;
            }
            if let Some(bytes) = decode_chunk(&event.data)? {
                // stop reading, the rest of the stream is ignored
                drop(events);
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> anyhow::Error {
    match err {
        EventStreamError::Transport(err) => {
            anyhow::Error::new(err.without_url()).context("Gemini stream error")
        }
        other => anyhow!("Malformed Gemini event stream: {other}"),
    }
}

fn decode_chunk(payload: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let chunk = StreamChunk::parse(payload).context("Failed to decode Gemini stream chunk")?;
    if let Some(text) = chunk.first_text() {
        debug!("Gemini text response: {text}");
    }
    let Some(inline) = chunk.first_inline_data() else {
        return Ok(None);
    };
    debug!(
        "Inline data chunk, mime type {}",
        inline.mime_type.as_deref().unwrap_or("unknown")
    );
    let data = inline.data.as_deref().unwrap_or_default();
    general_purpose::STANDARD
        .decode(data)
        .map(Some)
        .context("Failed to base64-decode inline image")
}

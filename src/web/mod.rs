//! HTTP surface: upload form, generation endpoint and generated file retrieval.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::{DefaultBodyLimit, Multipart};
use tower_http::services::ServeDir;

use crate::config::GeneratorConfig;
use crate::constants::INTERNAL_ERROR_MESSAGE;
use crate::dispatch::{Dispatcher, GeneratedOutput};
use crate::intake::{UploadIntake, UploadedFile};
use crate::providers::{GenerationFailure, Provider};

mod files;
mod prelude;
mod views;

use files::{download_handler, view_handler};
use prelude::*;
use views::{favicon_handler, index_handler};

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    config: Arc<GeneratorConfig>,
    intake: Arc<UploadIntake>,
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Builds the intake, dispatcher and provider clients from `config`.
    pub fn new(config: GeneratorConfig) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::new(&config)?;
        Ok(Self {
            intake: Arc::new(UploadIntake::new(&config)),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        })
    }
}

/// JSON body returned by `POST /generate`, success or not.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GenerateResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            image_url: None,
            filename: None,
            error: Some(message.into()),
        }
    }
}

impl From<Result<GeneratedOutput, GenerationFailure>> for GenerateResponse {
    fn from(result: Result<GeneratedOutput, GenerationFailure>) -> Self {
        match result {
            Ok(output) => Self {
                success: true,
                image_url: Some(output.image_url),
                filename: Some(output.filename),
                error: None,
            },
            Err(failure) => Self::error(failure.message),
        }
    }
}

// Failures are reported in the body, the status stays 200.
impl IntoResponse for GenerateResponse {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Default)]
struct GenerateForm {
    prompt: String,
    api_choice: Option<String>,
    images: Vec<UploadedFile>,
}

async fn read_generate_form(mut multipart: Multipart) -> Result<GenerateForm, MixerError> {
    let mut form = GenerateForm::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "prompt" => form.prompt = field.text().await?,
            "api_choice" => form.api_choice = Some(field.text().await?),
            "images" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                form.images.push(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn generate(
    state: &AppState,
    multipart: Multipart,
) -> Result<Result<GeneratedOutput, GenerationFailure>, MixerError> {
    let form = read_generate_form(multipart).await?;
    let provider = match Provider::from_choice(form.api_choice.as_deref()) {
        Ok(provider) => provider,
        Err(failure) => return Ok(Err(failure)),
    };
    info!(
        "Generate request: provider={provider} images={}",
        form.images.len()
    );
    let staged = state.intake.stage(&form.images, provider).await?;
    Ok(state.dispatcher.dispatch(&form.prompt, &staged, provider).await)
}

/// handles the /generate POST
#[instrument(skip_all)]
async fn generate_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> GenerateResponse {
    match generate(&state, multipart).await {
        Ok(result) => result.into(),
        Err(err) => {
            error!("Error in generate route: {err}");
            GenerateResponse::error(INTERNAL_ERROR_MESSAGE)
        }
    }
}

fn create_router(config: &GeneratorConfig) -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route(
            "/generate",
            axum::routing::post(generate_handler)
                .layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/download/{filename}", axum::routing::get(download_handler))
        .route("/view/{filename}", axum::routing::get(view_handler))
        .route("/favicon.ico", axum::routing::get(favicon_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
}

/// The full application router, ready to serve.
pub fn build_app(state: AppState) -> Router {
    create_router(&state.config).with_state(state)
}

/// Creates the working directories, then serves until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    config: GeneratorConfig,
) -> Result<(), anyhow::Error> {
    config.ensure_dirs().await?;
    let app = build_app(AppState::new(config)?);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

use axum::body::Body;
use axum::http::header::CONTENT_DISPOSITION;
use axum::response::Response;

use super::prelude::*;

/// Serves a generated image as an attachment.
#[instrument(skip_all, fields(filename = %filename))]
pub(crate) async fn download_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, MixerError> {
    serve_output(&state, &filename, true).await
}

/// Serves a generated image inline, for previews.
#[instrument(skip_all, fields(filename = %filename))]
pub(crate) async fn view_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, MixerError> {
    serve_output(&state, &filename, false).await
}

async fn serve_output(
    state: &AppState,
    filename: &str,
    attachment: bool,
) -> Result<Response, MixerError> {
    let Some(path) = state.dispatcher.store().resolve(filename).await? else {
        return Err(MixerError::NotFound(filename.to_string()));
    };
    let bytes = tokio::fs::read(&path).await?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, mime.as_ref());
    if attachment {
        builder = builder.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    }
    builder.body(Body::from(bytes)).map_err(MixerError::from)
}

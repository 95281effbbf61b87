//! Error handling

use axum::response::IntoResponse;
use tracing::info;

/// Errors raised by the web layer, outside the generation pipeline.
#[derive(Debug)]
pub enum MixerError {
    /// When you didn't do the right thing
    BadRequest(String),
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for MixerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixerError::BadRequest(message) => write!(f, "bad request: {message}"),
            MixerError::NotFound(what) => write!(f, "not found: {what}"),
            MixerError::InternalServerError(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for MixerError {}

impl From<std::io::Error> for MixerError {
    fn from(err: std::io::Error) -> Self {
        MixerError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for MixerError {
    fn from(err: axum::http::Error) -> Self {
        MixerError::InternalServerError(err.to_string())
    }
}

impl From<url::ParseError> for MixerError {
    fn from(err: url::ParseError) -> Self {
        MixerError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for MixerError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        MixerError::BadRequest(err.body_text())
    }
}

impl IntoResponse for MixerError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MixerError::BadRequest(message) => {
                info!("Bad request received: {message}");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Request"));
                *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
                response
            }
            MixerError::NotFound(url) => {
                tracing::error!("404 {url}");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("File not found"));
                *response.status_mut() = axum::http::StatusCode::NOT_FOUND;
                response
            }
            MixerError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

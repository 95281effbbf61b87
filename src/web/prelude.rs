pub(crate) use crate::error::MixerError;
pub(crate) use crate::web::AppState;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Path, State};
pub(crate) use axum::http::{StatusCode, header::CONTENT_TYPE};
pub(crate) use axum::response::IntoResponse;
pub(crate) use serde::Serialize;
pub(crate) use tracing::{error, info, instrument};

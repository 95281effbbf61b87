use super::prelude::*;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) nano_available: bool,
    pub(crate) max_upload_mb: usize,
}

/// handles the / GET
pub(crate) async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    IndexTemplate {
        nano_available: state.dispatcher.nano_available(),
        max_upload_mb: state.config.max_upload_bytes / (1024 * 1024),
    }
}

/// Browsers ask for this on every page load, we don't have one.
pub(crate) async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

//! Shared constants for things
//!

/// Extensions accepted by the upload intake, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Longest sanitised upload name kept in a staged file name, extension included.
pub const MAX_STAGED_NAME_LEN: usize = 100;

/// Prompt used when images are uploaded without any text.
pub const COMBINE_PROMPT: &str = "Combine these images in a way that makes sense.";

/// Default Gemini image model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/";

/// MIME type attached to every inline image sent to Gemini.
pub const GEMINI_INLINE_MIME_TYPE: &str = "image/jpeg";

/// Header carrying the Gemini API key.
pub const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

/// Subdirectory of the static directory holding publicly reachable uploads.
pub const PUBLIC_UPLOADS_DIR: &str = "uploads";

/// Filename prefix for images produced by Gemini.
pub const GEMINI_OUTPUT_TAG: &str = "generated";

/// Filename prefix for images produced by the secondary API.
pub const NANO_OUTPUT_TAG: &str = "nano";

/// Extension used when the output format can't be sniffed.
pub const DEFAULT_OUTPUT_EXTENSION: &str = "png";

/// Default upstream timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;

/// Default request body limit for `/generate`, in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 16;

/// Shown when a route fails outside the generation pipeline.
pub const INTERNAL_ERROR_MESSAGE: &str = "An error occurred while generating the image.";

#[cfg(test)]
/// Fake key used in tests
pub const TEST_API_KEY: &str = "test-gemini-key";

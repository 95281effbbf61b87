//! Upstream image generation providers and their shared result types.

use std::fmt::Display;
use std::str::FromStr;

use crate::constants::{GEMINI_OUTPUT_TAG, NANO_OUTPUT_TAG};

pub mod gemini;
pub mod nano;

pub use gemini::GeminiClient;
pub use nano::NanoClient;

/// Which upstream service handles a request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Provider {
    /// Gemini streaming API, fed local files inline
    Gemini,
    /// Secondary URL-based API, fed public links
    #[default]
    Nano,
}

impl Provider {
    /// Prefix used for output filenames from this provider.
    pub fn output_tag(self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_OUTPUT_TAG,
            Provider::Nano => NANO_OUTPUT_TAG,
        }
    }

    /// Parses the `api_choice` form value, a blank value picks the default.
    pub fn from_choice(value: Option<&str>) -> Result<Self, GenerationFailure> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(value) => value.parse().map_err(|_| {
                GenerationFailure::with_message(
                    FailureKind::InvalidInput,
                    format!("Unknown API choice: {value}"),
                )
            }),
        }
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "nano" => Ok(Provider::Nano),
            _ => Err(()),
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Nano => write!(f, "nano"),
        }
    }
}

/// Image bytes returned by a provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedImage {
    /// Raw image data
    pub bytes: Vec<u8>,
    /// Extension to store it under, without the dot
    pub extension: &'static str,
}

/// Stable failure categories surfaced to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Empty prompt or bad selector
    InvalidInput,
    /// Upstream rate limit or quota hit
    QuotaExceeded,
    /// Upstream rejected the API key
    InvalidCredentials,
    /// Upstream returned nothing usable, or failed in an unclassified way
    GenerationError,
    /// Couldn't reach the secondary API
    UpstreamUnavailable,
}

impl FailureKind {
    /// User-facing message for this kind.
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "Please enter a prompt",
            FailureKind::QuotaExceeded => {
                "API quota exceeded. Please wait for quota reset or use a different API key. Free tier quotas reset daily."
            }
            FailureKind::InvalidCredentials => {
                "Invalid API key. Please check your Google AI API key."
            }
            FailureKind::GenerationError => {
                "Failed to generate image. Please try again with a different prompt."
            }
            FailureKind::UpstreamUnavailable => {
                "The image service is currently unavailable. Please try again later."
            }
        }
    }
}

/// A failed generation, carrying the message shown to the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GenerationFailure {
    /// Category
    pub kind: FailureKind,
    /// User-facing message
    pub message: String,
}

impl GenerationFailure {
    /// Failure with the default message for `kind`.
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }

    /// Failure with a custom message.
    pub fn with_message(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<FailureKind> for GenerationFailure {
    fn from(kind: FailureKind) -> Self {
        Self::new(kind)
    }
}

impl Display for GenerationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GenerationFailure {}

/// Outcome of a single provider call.
pub type GenerationResult = Result<GeneratedImage, GenerationFailure>;

/// Sorts an upstream error message into a failure kind by looking for
/// well-known fragments; upstream gives us no structured code.
pub fn classify_error(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if lowered.contains("429") || lowered.contains("quota") {
        FailureKind::QuotaExceeded
    } else if lowered.contains("api key") || lowered.contains("authentication") {
        FailureKind::InvalidCredentials
    } else {
        FailureKind::GenerationError
    }
}

//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL, DEFAULT_MAX_UPLOAD_MB,
    DEFAULT_REQUEST_TIMEOUT_SECONDS,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "MIXER_DEBUG")]
    /// Enable debug logging. Env: MIXER_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "5000", env = "MIXER_PORT")]
    /// http listener, defaults to `5000`.
    /// Env: MIXER_PORT
    pub port: NonZeroU16,
    #[clap(long, short, default_value = "127.0.0.1", env = "MIXER_LISTEN_ADDRESS")]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: MIXER_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, required = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// Google AI API key. Env: GEMINI_API_KEY
    pub gemini_api_key: String,
    #[clap(long, default_value = DEFAULT_GEMINI_MODEL, env = "GEMINI_MODEL")]
    /// Gemini image model. Env: GEMINI_MODEL
    pub gemini_model: String,
    #[clap(long, default_value = DEFAULT_GEMINI_API_BASE, env = "GEMINI_API_BASE")]
    /// Gemini API base URL. Env: GEMINI_API_BASE
    pub gemini_api_base: String,

    #[clap(long, env = "NANO_API_URL")]
    /// Endpoint of the secondary URL-based image API. Env: NANO_API_URL
    pub nano_api_url: Option<String>,

    #[clap(long, default_value = "http://localhost:5000/", env = "MIXER_PUBLIC_URL")]
    /// Public base URL of this site, used to build links to staged uploads
    /// the secondary API fetches. Env: MIXER_PUBLIC_URL
    pub public_url: String,

    #[clap(long, default_value = "./uploads", env = "MIXER_UPLOAD_DIR")]
    /// Staging directory for uploads sent inline to Gemini. Env: MIXER_UPLOAD_DIR
    pub upload_dir: PathBuf,
    #[clap(long, default_value = "./output", env = "MIXER_OUTPUT_DIR")]
    /// Where generated images are written. Env: MIXER_OUTPUT_DIR
    pub output_dir: PathBuf,
    #[clap(long, default_value = "./static", env = "MIXER_STATIC_DIR")]
    /// Static files root, also holds public uploads. Env: MIXER_STATIC_DIR
    pub static_dir: PathBuf,

    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS, env = "MIXER_REQUEST_TIMEOUT")]
    /// Upstream request timeout in seconds. Env: MIXER_REQUEST_TIMEOUT
    pub request_timeout: u64,
    #[clap(long, default_value_t = DEFAULT_MAX_UPLOAD_MB, env = "MIXER_MAX_UPLOAD_MB")]
    /// Maximum `/generate` body size in megabytes. Env: MIXER_MAX_UPLOAD_MB
    pub max_upload_mb: usize,
}

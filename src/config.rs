//! Config handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;
use crate::constants::PUBLIC_UPLOADS_DIR;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Runtime configuration, built once at startup and shared by reference.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Google AI API key
    pub gemini_api_key: String,
    /// Gemini model name, eg `gemini-2.5-flash-image-preview`
    pub gemini_model: String,
    /// Gemini API base, always ends in `/`
    pub gemini_api_base: Url,
    /// Secondary API endpoint, if one is configured
    pub nano_api_url: Option<Url>,
    /// Public base URL of this site, always ends in `/`
    pub public_url: Url,
    /// Staging directory for Gemini uploads
    pub upload_dir: PathBuf,
    /// Generated image directory
    pub output_dir: PathBuf,
    /// Static files root
    pub static_dir: PathBuf,
    /// Upper bound on a single upstream call
    pub request_timeout: Duration,
    /// Body limit for `/generate`
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_base", &self.gemini_api_base.as_str())
            .field("nano_api_url", &self.nano_api_url.as_ref().map(Url::as_str))
            .field("public_url", &self.public_url.as_str())
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("static_dir", &self.static_dir)
            .field("request_timeout", &self.request_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl TryFrom<&CliOptions> for GeneratorConfig {
    type Error = anyhow::Error;

    fn try_from(cli: &CliOptions) -> Result<Self, Self::Error> {
        let gemini_api_key = cli.gemini_api_key.trim().to_string();
        if gemini_api_key.is_empty() {
            bail!(
                "GEMINI_API_KEY environment variable is required. Please set it with your Google AI API key."
            );
        }

        let gemini_api_base = parse_base_url(&cli.gemini_api_base)
            .with_context(|| format!("Invalid Gemini API base: {}", cli.gemini_api_base))?;
        let public_url = parse_base_url(&cli.public_url)
            .with_context(|| format!("Invalid public URL: {}", cli.public_url))?;
        let nano_api_url = match cli.nano_api_url.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(
                Url::parse(value).with_context(|| format!("Invalid nano API URL: {value}"))?,
            ),
            _ => None,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: cli.gemini_model.trim().to_string(),
            gemini_api_base,
            nano_api_url,
            public_url,
            upload_dir: cli.upload_dir.clone(),
            output_dir: cli.output_dir.clone(),
            static_dir: cli.static_dir.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout.max(1)),
            max_upload_bytes: cli.max_upload_mb.saturating_mul(1024 * 1024),
        })
    }
}

impl GeneratorConfig {
    /// Where uploads destined for the secondary API are written.
    pub fn public_uploads_dir(&self) -> PathBuf {
        self.static_dir.join(PUBLIC_UPLOADS_DIR)
    }

    /// Creates the upload, output and public upload directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.upload_dir.as_path(),
            self.output_dir.as_path(),
            self.public_uploads_dir().as_path(),
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Builds the shared HTTP client used by both providers.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        build_http_client(self.request_timeout)
    }

    #[cfg(test)]
    /// Config rooted in a temporary directory, with upstreams pointed at `gemini` and `nano`.
    pub(crate) fn for_tests(root: &Path, gemini: &str, nano: Option<&str>) -> Self {
        Self {
            gemini_api_key: crate::constants::TEST_API_KEY.to_string(),
            gemini_model: crate::constants::DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_base: parse_base_url(gemini).expect("gemini base"),
            nano_api_url: nano.map(|value| Url::parse(value).expect("nano url")),
            public_url: parse_base_url("http://localhost:5000").expect("public url"),
            upload_dir: root.join("uploads"),
            output_dir: root.join("output"),
            static_dir: root.join("static"),
            request_timeout: Duration::from_secs(5),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// HTTP client whose `timeout` bounds a whole call, body included.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Parses a URL that other paths get joined onto, forcing a trailing slash.
pub fn parse_base_url(value: &str) -> Result<Url, url::ParseError> {
    let value = value.trim();
    if value.ends_with('/') {
        Url::parse(value)
    } else {
        Url::parse(&format!("{value}/"))
    }
}

/// Returns true when `path` names a plain file name with no directory parts.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && matches!(
            path.components().collect::<Vec<_>>().as_slice(),
            [std::path::Component::Normal(_)]
        )
        && !name.contains('/')
        && !name.contains('\\')
}

use anyhow::{Context, Result, anyhow, bail};
use banana_mixer::config::{build_http_client, parse_base_url, setup_logging};
use banana_mixer::constants::{
    DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL, DEFAULT_REQUEST_TIMEOUT_SECONDS,
    GEMINI_OUTPUT_TAG,
};
use banana_mixer::providers::GeminiClient;
use banana_mixer::store::ResultStore;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Generate one image with Gemini from the command line.
///
/// Minimal UX:
///   generate_image "a banana wearing a costume" --image cat.jpg
#[derive(Parser, Debug)]
#[command(name = "generate_image")]
#[command(about = "Generate or mix an image with the Gemini image model and save it locally")]
struct Args {
    /// What to draw
    #[arg(default_value = "Generate an image of a banana wearing a costume.")]
    prompt: String,

    /// Images to mix in, sent inline
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Google AI API key
    #[arg(required = true, long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Image model
    #[arg(long, default_value = DEFAULT_GEMINI_MODEL, env = "GEMINI_MODEL")]
    model: String,

    /// API base URL
    #[arg(long, default_value = DEFAULT_GEMINI_API_BASE, env = "GEMINI_API_BASE")]
    api_base: String,

    /// Output directory, the image lands in <dir>/generated_<uuid>.png
    #[arg(long, default_value = "./output", env = "MIXER_OUTPUT_DIR")]
    out_dir: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS)]
    timeout: u64,

    /// Debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).context("Failed to set up logging")?;

    let api_key = args.gemini_api_key.trim();
    if api_key.is_empty() {
        bail!("GEMINI_API_KEY must not be blank");
    }
    if args.prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }
    for image in &args.images {
        if !image.is_file() {
            bail!("Image not found: {}", image.display());
        }
    }

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let api_base = parse_base_url(&args.api_base)
        .with_context(|| format!("Invalid API base: {}", args.api_base))?;
    let http = build_http_client(Duration::from_secs(args.timeout.max(1)))
        .context("Failed to build HTTP client")?;
    let client = GeminiClient::from_parts(http, &api_base, &args.model, api_key)?;

    eprintln!("Generating image with {}", args.model);
    eprintln!("Prompt: {}", args.prompt);
    let image = client
        .generate(args.prompt.trim(), &args.images)
        .await
        .map_err(|failure| anyhow!(failure.message))?;

    let artifact = ResultStore::in_dir(args.out_dir.clone())
        .save(GEMINI_OUTPUT_TAG, &image)
        .await
        .context("Failed to save image")?;

    eprintln!("Saved: {}", artifact.path.display());
    Ok(())
}

//! Routes a generation request to a provider and stores what comes back.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::GeneratorConfig;
use crate::constants::COMBINE_PROMPT;
use crate::intake::{StagedImage, StagingGuard};
use crate::providers::{
    FailureKind, GeminiClient, GenerationFailure, GenerationResult, NanoClient, Provider,
};
use crate::store::ResultStore;

/// Where a successful generation ended up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedOutput {
    /// Stored file name
    pub filename: String,
    /// Link the caller fetches it from
    pub image_url: String,
}

/// Picks a provider per request, makes one upstream call and stores the result.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    gemini: GeminiClient,
    nano: Option<NanoClient>,
    store: ResultStore,
}

impl Dispatcher {
    /// Builds both provider clients around one shared HTTP client.
    pub fn new(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let client = config
            .http_client()
            .context("Failed to build HTTP client")?;
        let gemini =
            GeminiClient::new(config, client.clone()).context("Invalid Gemini endpoint")?;
        let nano = config
            .nano_api_url
            .clone()
            .map(|endpoint| NanoClient::new(endpoint, client));
        Ok(Self {
            gemini,
            nano,
            store: ResultStore::new(config),
        })
    }

    /// The store generated images are written to.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// True when the secondary API has an endpoint configured.
    pub fn nano_available(&self) -> bool {
        self.nano.is_some()
    }

    /// Runs one generation. Never retries.
    ///
    /// Images staged for Gemini are removed once the call ends, whatever the
    /// outcome, including when this future is dropped before completing.
    #[instrument(skip_all, fields(provider = %provider, images = staged.len()))]
    pub async fn dispatch(
        &self,
        prompt: &str,
        staged: &[StagedImage],
        provider: Provider,
    ) -> Result<GeneratedOutput, GenerationFailure> {
        let _cleanup = (provider == Provider::Gemini).then(|| StagingGuard::new(staged));

        let prompt = effective_prompt(prompt, staged)?;
        let image = self.call_provider(prompt, staged, provider).await?;
        let artifact = self
            .store
            .save(provider.output_tag(), &image)
            .await
            .map_err(|err| {
                error!("Failed to save generated image: {err}");
                GenerationFailure::new(FailureKind::GenerationError)
            })?;
        info!("Generated {}", artifact.filename);

        Ok(GeneratedOutput {
            image_url: artifact.download_url(),
            filename: artifact.filename,
        })
    }

    async fn call_provider(
        &self,
        prompt: &str,
        staged: &[StagedImage],
        provider: Provider,
    ) -> GenerationResult {
        match provider {
            Provider::Gemini => {
                let paths: Vec<PathBuf> = staged
                    .iter()
                    .map(|image| image.storage_path.clone())
                    .collect();
                self.gemini.generate(prompt, &paths).await
            }
            Provider::Nano => {
                let Some(nano) = &self.nano else {
                    warn!("Nano API requested but no endpoint is configured");
                    return Err(GenerationFailure::new(FailureKind::UpstreamUnavailable));
                };
                let urls: Vec<Url> = staged
                    .iter()
                    .filter_map(|image| image.public_url.clone())
                    .collect();
                nano.generate(prompt, &urls).await
            }
        }
    }
}

/// The prompt actually sent upstream: the trimmed text, or the combine
/// instruction when only images were given.
pub fn effective_prompt<'a>(
    prompt: &'a str,
    staged: &[StagedImage],
) -> Result<&'a str, GenerationFailure> {
    let prompt = prompt.trim();
    if !prompt.is_empty() {
        Ok(prompt)
    } else if !staged.is_empty() {
        Ok(COMBINE_PROMPT)
    } else {
        Err(GenerationFailure::new(FailureKind::InvalidInput))
    }
}

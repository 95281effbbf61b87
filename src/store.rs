//! Result store for generated images.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::config::{GeneratorConfig, is_plain_file_name};
use crate::providers::GeneratedImage;

/// A generated image written to the output directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputArtifact {
    /// `<tag>_<uuid>.<ext>`
    pub filename: String,
    /// Full path on disk
    pub path: PathBuf,
}

impl OutputArtifact {
    /// Link the artifact is downloaded through.
    pub fn download_url(&self) -> String {
        format!("/download/{}", self.filename)
    }
}

/// Writes generated images under uniquely named files.
#[derive(Clone, Debug)]
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    /// Store writing to the configured output directory.
    pub fn new(config: &GeneratorConfig) -> Self {
        Self::in_dir(config.output_dir.clone())
    }

    /// Store writing straight into `output_dir`.
    pub fn in_dir(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Writes `image` as `<tag>_<uuid>.<ext>`. Every call gets a new name.
    pub async fn save(
        &self,
        tag: &str,
        image: &GeneratedImage,
    ) -> std::io::Result<OutputArtifact> {
        let filename = format!("{tag}_{}.{}", Uuid::new_v4(), image.extension);
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, &image.bytes).await?;
        info!("Saved {} ({} bytes)", path.display(), image.bytes.len());
        Ok(OutputArtifact { filename, path })
    }

    /// Path of a stored artifact, if `filename` names one.
    ///
    /// Anything but a bare file name resolves to `None`.
    pub async fn resolve(&self, filename: &str) -> std::io::Result<Option<PathBuf>> {
        if !is_plain_file_name(filename) {
            return Ok(None);
        }
        let path = self.output_dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

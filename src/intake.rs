//! Upload intake: filters user-submitted images and stages them on disk.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::constants::{ALLOWED_EXTENSIONS, MAX_STAGED_NAME_LEN, PUBLIC_UPLOADS_DIR};
use crate::error::MixerError;
use crate::providers::Provider;

/// A file part from the upload form.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// Name as sent by the browser
    pub filename: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// An upload persisted for exactly one provider call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedImage {
    /// Name as sent by the browser
    pub original_name: String,
    /// Where the bytes were written
    pub storage_path: PathBuf,
    /// Public link to the file, set when staged for a URL-based provider
    pub public_url: Option<Url>,
}

/// Deletes the files it tracks when dropped, unless disarmed.
///
/// Runs on every exit path, including a request future dropped mid-await.
#[derive(Debug, Default)]
pub(crate) struct StagingGuard {
    paths: Vec<PathBuf>,
}

impl StagingGuard {
    /// Guard over the storage paths of `staged`.
    pub(crate) fn new(staged: &[StagedImage]) -> Self {
        Self {
            paths: staged
                .iter()
                .map(|image| image.storage_path.clone())
                .collect(),
        }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Leaves the tracked files in place.
    fn disarm(mut self) {
        self.paths.clear();
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed staged image {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("Failed to remove staged image {}: {err}", path.display()),
            }
        }
    }
}

/// Writes uploads to the staging area the chosen provider reads from.
#[derive(Clone, Debug)]
pub struct UploadIntake {
    upload_dir: PathBuf,
    public_dir: PathBuf,
    public_url: Url,
}

impl UploadIntake {
    /// Intake using the directories from `config`.
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            public_dir: config.public_uploads_dir(),
            public_url: config.public_url.clone(),
        }
    }

    /// Stages every upload with an allowed extension, skipping the rest.
    ///
    /// Gemini reads files locally so they go to the upload dir. The secondary
    /// API fetches them by link, so they go under the static dir and get a
    /// public URL. If any write fails, files already written for this call
    /// are removed before the error is returned.
    #[instrument(skip_all, fields(provider = %provider, files = files.len()))]
    pub async fn stage(
        &self,
        files: &[UploadedFile],
        provider: Provider,
    ) -> Result<Vec<StagedImage>, MixerError> {
        let mut guard = StagingGuard::default();
        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            let Some(extension) = allowed_extension(&file.filename) else {
                debug!("Skipping upload {:?}", file.filename);
                continue;
            };
            let unique_name = format!(
                "{}_{}",
                Uuid::new_v4(),
                safe_name_with_extension(&file.filename, &extension)
            );

            let (storage_path, public_url) = match provider {
                Provider::Gemini => (self.upload_dir.join(&unique_name), None),
                Provider::Nano => {
                    let url = self
                        .public_url
                        .join(&format!("static/{PUBLIC_UPLOADS_DIR}/{unique_name}"))?;
                    (self.public_dir.join(&unique_name), Some(url))
                }
            };
            guard.track(storage_path.clone());
            tokio::fs::write(&storage_path, &file.bytes).await?;
            debug!("Staged {} at {}", file.filename, storage_path.display());

            staged.push(StagedImage {
                original_name: file.filename.clone(),
                storage_path,
                public_url,
            });
        }
        guard.disarm();
        Ok(staged)
    }
}

/// Returns true when `filename` has one of the allowed image extensions.
pub fn allowed_file(filename: &str) -> bool {
    allowed_extension(filename).is_some()
}

fn allowed_extension(filename: &str) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Reduces a client-supplied filename to something safe to put on disk:
/// the last path component, ASCII letters, digits, `_`, `.` and `-` only,
/// with no leading or trailing dots or underscores.
pub fn secure_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn safe_name_with_extension(filename: &str, extension: &str) -> String {
    let safe = secure_filename(filename);
    let suffix = format!(".{extension}");
    if safe.len() <= suffix.len() || !safe.to_ascii_lowercase().ends_with(&suffix) {
        return format!("image{suffix}");
    }
    if safe.len() <= MAX_STAGED_NAME_LEN {
        return safe;
    }
    // sanitised names are ASCII, any byte offset is a char boundary
    let (head, tail) = safe.split_at(safe.len() - suffix.len());
    let keep = MAX_STAGED_NAME_LEN - suffix.len();
    let stem = head
        .get(..keep)
        .unwrap_or(head)
        .trim_end_matches(|c| c == '.' || c == '_');
    format!("{stem}{tail}")
}

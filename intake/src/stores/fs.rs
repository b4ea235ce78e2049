use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::instrument;

use crate::stores::{BlobError, BlobStore};

/// Stores slips on the local filesystem under `<root>/<folder>/<name>`,
/// served back by the router under the public base URL.
///
/// When the folder cannot be created the blob lands in the root instead.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    folder: String,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, folder: &str, public_base_url: &str) -> Self {
        FsBlobStore {
            root: root.into(),
            folder: folder.trim_matches('/').to_owned(),
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the next blob goes to, with its URL path relative to the root.
    async fn target_dir(&self) -> Result<(PathBuf, String), BlobError> {
        if !self.folder.is_empty() {
            let dir = self.root.join(&self.folder);
            match fs::create_dir_all(&dir).await {
                Ok(_) => return Ok((dir, format!("{}/", self.folder))),
                Err(err) => tracing::warn!(
                    folder = %self.folder,
                    "failed to create slip folder, storing at root: {}",
                    err
                ),
            }
        }

        fs::create_dir_all(&self.root).await?;
        Ok((self.root.clone(), String::new()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip_all, fields(name = name, mime_type = mime_type, len = bytes.len()))]
    async fn store(&self, bytes: Vec<u8>, mime_type: &str, name: &str) -> Result<String, BlobError> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| *n == name)
            .ok_or_else(|| BlobError::InvalidName(name.to_owned()))?;

        let (dir, prefix) = self.target_dir().await?;
        fs::write(dir.join(file_name), &bytes).await?;

        tracing::debug!("stored slip");
        Ok(format!("{}/{}{}", self.public_base_url, prefix, file_name))
    }
}

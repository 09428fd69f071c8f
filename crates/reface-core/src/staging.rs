//! Input staging: download remote share-link files to local paths.
//!
//! Downloads stream to a `.part` sibling and are renamed into place only
//! once complete, so a partially transferred file never sits at the
//! destination path. No retries and no timeouts beyond the client defaults.

use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::links::{self, LinkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("link: {0}")]
    Link(#[from] LinkError),
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Default direct-download endpoint share links resolve against.
const DOWNLOAD_BASE: &str = "https://drive.google.com/uc?id=";

/// Downloads share-link files to local destinations.
#[derive(Clone)]
pub struct Stager {
    client: reqwest::Client,
    download_base: String,
}

impl Default for Stager {
    fn default() -> Self {
        Self::new()
    }
}

impl Stager {
    pub fn new() -> Self {
        Self::with_download_base(DOWNLOAD_BASE)
    }

    /// Stager resolving share links against a non-default endpoint.
    pub fn with_download_base(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            download_base: base.into(),
        }
    }

    /// Resolve `url` and download its file to `dest`, overwriting any prior
    /// content. Returns the number of bytes transferred.
    pub async fn stage(&self, url: &str, dest: &Path) -> Result<u64, StagingError> {
        let direct = links::direct_download_url_with_base(&self.download_base, url)?;
        tracing::debug!(url, direct = %direct, dest = %dest.display(), "staging input");
        self.fetch(&direct, dest).await
    }

    /// Download a direct URL to `dest`, overwriting any prior content.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StagingError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length();

        let part_path = dest.with_extension("part");
        let mut file = File::create(&part_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part_path, dest).await?;

        tracing::info!(
            dest = %dest.display(),
            bytes = downloaded,
            total = ?total,
            "input staged"
        );
        Ok(downloaded)
    }
}

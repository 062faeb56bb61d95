//! Circuit artifact retrieval.
//!
//! The proving and verifying keys are produced out of band by
//! `murmur-keygen` and served over HTTP. The client fetches with
//! endpoint failover, optionally pins the verifying key to a BLAKE3
//! checksum, and caches artifacts under the data directory.

use murmur_types::{MurmurError, MurmurResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    ProvingKey,
    VerifyingKey,
}

impl ArtifactKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::ProvingKey => "membership.pk.bin",
            ArtifactKind::VerifyingKey => "membership.vk.bin",
        }
    }
}

pub struct ArtifactClient {
    client: reqwest::Client,
    base_urls: Vec<String>,
    cache_dir: PathBuf,
    /// When set, a fetched verifying key must hash to this value.
    pinned_vk_hash: Option<String>,
}

impl ArtifactClient {
    pub fn new(
        base_urls: Vec<String>,
        cache_dir: impl Into<PathBuf>,
        pinned_vk_hash: Option<String>,
    ) -> MurmurResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| MurmurError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_urls,
            cache_dir: cache_dir.into(),
            pinned_vk_hash,
        })
    }

    fn cache_path(&self, kind: ArtifactKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    fn check_pin(&self, kind: ArtifactKind, bytes: &[u8]) -> MurmurResult<()> {
        if kind != ArtifactKind::VerifyingKey {
            return Ok(());
        }
        if let Some(expected) = &self.pinned_vk_hash {
            let actual = hex::encode(blake3::hash(bytes).as_bytes());
            if &actual != expected {
                return Err(MurmurError::ArtifactUnavailable(format!(
                    "Verifying key checksum mismatch: expected {}, got {}",
                    expected, actual
                )));
            }
        }
        Ok(())
    }

    /// Fetch an artifact, preferring the disk cache.
    pub async fn fetch(&self, kind: ArtifactKind) -> MurmurResult<Vec<u8>> {
        let cache_path = self.cache_path(kind);
        if let Ok(bytes) = tokio::fs::read(&cache_path).await {
            if self.check_pin(kind, &bytes).is_ok() {
                debug!(path = %cache_path.display(), "Artifact cache hit");
                return Ok(bytes);
            }
            warn!(path = %cache_path.display(), "Cached artifact failed checksum, refetching");
        }

        for base in &self.base_urls {
            let url = format!("{}/{}", base.trim_end_matches('/'), kind.file_name());
            debug!(%url, "Fetching artifact");

            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(%url, "Artifact fetch failed: {}", e);
                    continue;
                }
            };
            if !response.status().is_success() {
                warn!(%url, status = %response.status(), "Artifact endpoint error");
                continue;
            }

            let bytes = match response.bytes().await {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    warn!(%url, "Artifact body read failed: {}", e);
                    continue;
                }
            };

            self.check_pin(kind, &bytes)?;
            self.write_cache(&cache_path, &bytes).await;
            info!(%url, size = bytes.len(), "Fetched artifact");
            return Ok(bytes);
        }

        Err(MurmurError::ArtifactUnavailable(format!(
            "{} not available from any endpoint",
            kind.file_name()
        )))
    }

    async fn write_cache(&self, path: &Path, bytes: &[u8]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            warn!("Failed to create artifact cache dir: {}", e);
            return;
        }
        if let Err(e) = tokio::fs::write(path, bytes).await {
            warn!("Failed to cache artifact: {}", e);
        }
    }
}

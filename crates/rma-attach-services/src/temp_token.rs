//! Short-lived download tokens for generated files.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;
use rma_attach_core::models::{NewTempToken, TempToken};
use rma_attach_core::AppError;
use rma_attach_db::TempTokenStore;
use rma_attach_storage::{ByteStream, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const TOKEN_BYTES: usize = 32;

/// A resolved token ready to be streamed to a client.
pub struct TokenDownload {
    pub stream: ByteStream,
    pub display_name: String,
    pub content_length: u64,
}

/// Issues, resolves, revokes and sweeps temp tokens.
///
/// Token files live under the artifact storage root (the configured temp
/// directory); paths outside it are refused at issue time.
#[derive(Clone)]
pub struct TempTokenService {
    store: Arc<dyn TempTokenStore>,
    artifacts: Arc<dyn Storage>,
    default_ttl: Duration,
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl TempTokenService {
    pub fn new(store: Arc<dyn TempTokenStore>, artifacts: Arc<dyn Storage>, default_ttl: Duration) -> Self {
        Self {
            store,
            artifacts,
            default_ttl,
        }
    }

    /// Directory generated files should be written to.
    pub fn artifact_root(&self) -> &Path {
        self.artifacts.root()
    }

    /// Grant access to `file_path` for `ttl` (the configured default if `None`).
    #[tracing::instrument(skip(self), fields(file_path = %file_path.display()))]
    pub async fn issue(
        &self,
        file_path: &Path,
        display_name: &str,
        ttl: Option<Duration>,
    ) -> Result<TempToken, AppError> {
        if !file_path.starts_with(self.artifacts.root()) {
            return Err(AppError::InvalidInput(format!(
                "{} is outside the download directory",
                file_path.display()
            )));
        }

        let ttl = chrono::Duration::from_std(ttl.unwrap_or(self.default_ttl))
            .map_err(|e| AppError::InvalidInput(format!("Invalid token lifetime: {}", e)))?;
        let now = Utc::now();

        let token = self
            .store
            .insert(NewTempToken {
                token: generate_token(),
                file_path: file_path.to_string_lossy().into_owned(),
                display_name: display_name.to_string(),
                created_at: now,
                expires_at: now + ttl,
            })
            .await?;

        tracing::info!(token_id = %token.id, expires_at = %token.expires_at, "Temp token issued");
        Ok(token)
    }

    /// The file behind a token, or `None` once it expired or was revoked
    /// (whether or not the file is still on disk).
    pub async fn resolve(&self, token: &str) -> Result<Option<PathBuf>, AppError> {
        Ok(self.usable(token).await?.map(|t| PathBuf::from(t.file_path)))
    }

    /// Open the file behind a token for streaming.
    #[tracing::instrument(skip(self, token))]
    pub async fn resolve_download(&self, token: &str) -> Result<TokenDownload, AppError> {
        let row = self
            .usable(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Download link is invalid or has expired".to_string()))?;

        let path = PathBuf::from(&row.file_path);
        let content_length = self.artifacts.content_length(&path).await?;
        let stream = self.artifacts.download_stream(&path).await?;

        Ok(TokenDownload {
            stream,
            display_name: row.display_name,
            content_length,
        })
    }

    /// Revoke a token. Returns false if it was unknown.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        self.store.revoke(token).await
    }

    /// Delete the files of expired or revoked tokens and mark them reclaimed.
    ///
    /// Idempotent; concurrent sweeps count each token once. A file that is
    /// already gone still counts as reclaimed.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<usize, AppError> {
        let candidates = self.store.list_reclaimable(Utc::now()).await?;
        let mut reclaimed = 0;

        for token in candidates {
            let path = PathBuf::from(&token.file_path);
            if let Err(e) = self.artifacts.delete(&path).await {
                tracing::warn!(
                    error = %e,
                    token_id = %token.id,
                    file_path = %token.file_path,
                    "Failed to delete token file, will retry on next sweep"
                );
                continue;
            }
            if self.store.mark_reclaimed(token.id).await? {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            tracing::info!(reclaimed, "Temp token sweep reclaimed files");
        }
        Ok(reclaimed)
    }

    async fn usable(&self, token: &str) -> Result<Option<TempToken>, AppError> {
        let now = Utc::now();
        Ok(self
            .store
            .find(token)
            .await?
            .filter(|t| t.is_usable_at(now)))
    }
}

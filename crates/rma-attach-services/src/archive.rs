//! Packaging tracked attachments into a downloadable ZIP.

use anyhow::Context;
use rma_attach_core::models::Attachment;
use rma_attach_core::validation::numbered_name;
use rma_attach_core::AppError;
use rma_attach_db::AttachmentStore;
use rma_attach_storage::Storage;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::temp_token::TempTokenService;

const ARCHIVE_EXTENSION: &str = ".zip";

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResult {
    pub download_token: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub processed_count: usize,
    /// Requested ids that were not packaged.
    pub skipped: Vec<Uuid>,
}

/// Sanitize filename for archive entry to prevent path traversal.
/// Extracts only the base name (strips path components like `../`).
fn sanitize_archive_filename(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Entry names already used in one archive, compared case-insensitively.
#[derive(Default)]
struct EntryNames {
    used: HashSet<String>,
}

impl EntryNames {
    fn release(&mut self, name: &str) {
        self.used.remove(&name.to_lowercase());
    }

    fn claim(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 0;
        while !self.used.insert(candidate.to_lowercase()) {
            n += 1;
            candidate = numbered_name(name, n);
        }
        candidate
    }
}

fn archive_display_name(name: &str) -> String {
    let base = sanitize_archive_filename(name.trim(), "attachments");
    if base.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
        base
    } else {
        format!("{}{}", base, ARCHIVE_EXTENSION)
    }
}

fn entry_options(attachment: &Attachment) -> FileOptions<'static, ()> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let modified = time::OffsetDateTime::from_unix_timestamp(attachment.uploaded_at.timestamp())
        .ok()
        .and_then(|t| zip::DateTime::try_from(t).ok());
    match modified {
        Some(modified) => options.last_modified_time(modified),
        None => options,
    }
}

/// Builds ZIP bundles of tracked attachments and hands them out via temp tokens.
#[derive(Clone)]
pub struct ArchiveService {
    attachments: Arc<dyn AttachmentStore>,
    storage: Arc<dyn Storage>,
    tokens: TempTokenService,
}

impl ArchiveService {
    pub fn new(
        attachments: Arc<dyn AttachmentStore>,
        storage: Arc<dyn Storage>,
        tokens: TempTokenService,
    ) -> Self {
        Self {
            attachments,
            storage,
            tokens,
        }
    }

    /// Package the given attachments into one archive.
    ///
    /// Unknown, deleted, missing or unreadable files are skipped with a
    /// warning. Fails when nothing could be packaged.
    #[tracing::instrument(skip(self, ids), fields(requested = ids.len()))]
    pub async fn build_archive(
        &self,
        ids: &[Uuid],
        archive_name: &str,
    ) -> Result<ArchiveResult, AppError> {
        if ids.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one attachment id is required".to_string(),
            ));
        }

        let found = self.attachments.get_many(ids).await?;
        let mut skipped: Vec<Uuid> = ids
            .iter()
            .filter(|id| !found.iter().any(|a| a.id == **id))
            .copied()
            .collect();
        for id in &skipped {
            tracing::warn!(attachment_id = %id, "Attachment not found or deleted, skipping");
        }

        let display_name = archive_display_name(archive_name);
        let root = self.tokens.artifact_root().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create archive directory {}", root.display()))?;
        let archive_path = root.join(format!("{}{}", Uuid::new_v4(), ARCHIVE_EXTENSION));

        let packed = self
            .write_archive(&archive_path, &found, &mut skipped)
            .await;

        let processed_count = match packed {
            Ok(0) => {
                remove_partial(&archive_path).await;
                return Err(AppError::NotFound(
                    "None of the requested files could be read".to_string(),
                ));
            }
            Ok(count) => count,
            Err(e) => {
                remove_partial(&archive_path).await;
                return Err(e.into());
            }
        };

        let size_bytes = tokio::fs::metadata(&archive_path)
            .await
            .context("Failed to stat archive")?
            .len();

        let token = match self.tokens.issue(&archive_path, &display_name, None).await {
            Ok(token) => token,
            Err(e) => {
                remove_partial(&archive_path).await;
                return Err(e);
            }
        };

        tracing::info!(
            archive = %archive_path.display(),
            size_bytes,
            processed_count,
            skipped = skipped.len(),
            "Archive built"
        );

        Ok(ArchiveResult {
            download_token: token.token,
            file_name: display_name,
            size_bytes,
            processed_count,
            skipped,
        })
    }

    /// Stream every readable attachment into the archive. Returns how many
    /// entries were written.
    async fn write_archive(
        &self,
        archive_path: &Path,
        attachments: &[Attachment],
        skipped: &mut Vec<Uuid>,
    ) -> anyhow::Result<usize> {
        let target = archive_path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || File::create(&target))
            .await
            .context("Archive task panicked")?
            .with_context(|| format!("Failed to create archive {}", archive_path.display()))?;

        let mut zip = ZipWriter::new(file);
        let mut names = EntryNames::default();
        let mut count = 0;

        for attachment in attachments {
            let source = PathBuf::from(&attachment.storage_path);
            if !source.starts_with(self.storage.root()) {
                tracing::warn!(
                    attachment_id = %attachment.id,
                    storage_path = %attachment.storage_path,
                    "Attachment path outside storage root, skipping"
                );
                skipped.push(attachment.id);
                continue;
            }

            let fallback = format!("unnamed_{}", attachment.id);
            let entry = names.claim(&sanitize_archive_filename(&attachment.file_name, &fallback));
            let options = entry_options(attachment);
            let added_entry = entry.clone();

            let (returned, added) = tokio::task::spawn_blocking(move || {
                add_entry(zip, &source, &added_entry, options)
            })
            .await
            .context("Archive task panicked")??;
            zip = returned;

            match added {
                Ok(size_bytes) => {
                    tracing::debug!(entry = %entry, size_bytes, "Archive entry written");
                    count += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        attachment_id = %attachment.id,
                        storage_path = %attachment.storage_path,
                        error = %e,
                        "Attachment file unreadable, skipping"
                    );
                    names.release(&entry);
                    skipped.push(attachment.id);
                }
            }
        }

        tokio::task::spawn_blocking(move || zip.finish().map(|_| ()))
            .await
            .context("Archive task panicked")?
            .context("Failed to finalize ZIP archive")?;

        Ok(count)
    }
}

/// Copy one file into the archive without buffering it. A source that cannot
/// be opened or read is reported in the second value and leaves no entry
/// behind; failures of the archive itself are errors.
fn add_entry(
    mut zip: ZipWriter<File>,
    source: &Path,
    entry: &str,
    options: FileOptions<'static, ()>,
) -> anyhow::Result<(ZipWriter<File>, std::io::Result<u64>)> {
    let mut file = match File::open(source) {
        Ok(file) => file,
        Err(e) => return Ok((zip, Err(e))),
    };

    zip.start_file(entry, options)
        .with_context(|| format!("Failed to add file to ZIP: {}", entry))?;

    match std::io::copy(&mut file, &mut zip) {
        Ok(size) => Ok((zip, Ok(size))),
        Err(e) => {
            zip.abort_file()
                .with_context(|| format!("Failed to drop partial ZIP entry: {}", entry))?;
            Ok((zip, Err(e)))
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove partial archive");
        }
    }
}

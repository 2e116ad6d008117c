use chrono::Utc;
use rma_attach_core::constants::MAX_RENAME_ATTEMPTS;
use rma_attach_core::models::{Attachment, AuditAction, Category, NewAttachment};
use rma_attach_core::validation::numbered_name;
use rma_attach_core::{Actor, AppError};
use rma_attach_storage::local::BACKUP_TAG;
use rma_attach_storage::{StorageError, UploadReader};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::types::{
    ConflictStrategy, FileOutcome, StoredFile, UploadFile, UploadOutcome, UploadRequest,
};
use crate::context::EngineContext;

/// Stops the batch. Everything written so far is undone.
struct BatchAbort(String);

impl From<StorageError> for BatchAbort {
    fn from(err: StorageError) -> Self {
        BatchAbort(err.to_string())
    }
}

impl From<AppError> for BatchAbort {
    fn from(err: AppError) -> Self {
        BatchAbort(err.to_string())
    }
}

/// What currently holds a destination path: bytes on disk, an active
/// tracking row, both or neither.
struct Occupancy {
    on_disk: bool,
    tracked: Option<Attachment>,
}

impl Occupancy {
    fn is_free(&self) -> bool {
        !self.on_disk && self.tracked.is_none()
    }
}

/// A file this call put on disk, with what is needed to undo it.
enum Written {
    Created {
        attachment_id: Uuid,
        path: PathBuf,
    },
    Replaced {
        attachment_id: Uuid,
        path: PathBuf,
        /// `None` when the tracked file was already gone from disk.
        backup: Option<PathBuf>,
        /// `None` when an untracked file was adopted.
        previous: Option<Attachment>,
    },
}

/// Validates, de-conflicts, writes and records batches of uploaded files.
#[derive(Clone)]
pub struct UploadService {
    ctx: EngineContext,
    max_file_size_bytes: u64,
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn size_as_i64(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

impl UploadService {
    pub fn new(ctx: EngineContext, max_file_size_bytes: u64) -> Self {
        Self {
            ctx,
            max_file_size_bytes,
        }
    }

    /// Upload a batch of files into one record/sub-scope/category directory.
    ///
    /// Batch-wide problems (missing capability, unknown or inactive category,
    /// scope mismatch, bad ids) are returned as errors before anything is
    /// written. Everything after that is reported through the outcome.
    #[tracing::instrument(
        skip(self, files),
        fields(
            actor = %actor,
            record_id = request.record_id,
            sub_scope_id = ?request.sub_scope_id,
            category = %request.category_key,
            strategy = ?request.strategy,
            file_count = files.len()
        )
    )]
    pub async fn upload(
        &self,
        actor: &Actor,
        request: UploadRequest,
        files: Vec<UploadFile>,
    ) -> Result<UploadOutcome, AppError> {
        self.ctx.require_upload(actor).await?;
        let category = self.ctx.active_category(&request.category_key).await?;
        let dir = self
            .ctx
            .resolver
            .resolve(request.record_id, request.sub_scope_id, &category)?;

        if files.is_empty() {
            return Err(AppError::InvalidInput("No files were provided".to_string()));
        }

        if let Err(e) = self.ctx.storage.ensure_dir(&dir).await {
            tracing::error!(error = %e, dir = %dir.display(), "Destination directory unavailable");
            return Ok(Self::general_error(
                None,
                format!("Destination directory is not writable: {}", e),
            ));
        }

        // Conflict pre-scan: without a strategy, any collision aborts the
        // whole batch before a single byte is written. A tracked row whose
        // file is gone still holds the name.
        let mut conflicts = Vec::new();
        for file in &files {
            let Ok(path) = self.ctx.resolver.file_path(&dir, &file.name) else {
                continue;
            };
            match self.occupancy(&path).await {
                Ok(occupancy) if !occupancy.is_free() => conflicts.push(file.name.clone()),
                Ok(_) => {}
                Err(BatchAbort(message)) => {
                    return Ok(Self::general_error(
                        Some(file.name.clone()),
                        format!("Failed to check destination: {}", message),
                    ))
                }
            }
        }

        if !conflicts.is_empty() && request.strategy.is_none() {
            tracing::info!(conflicts = ?conflicts, "Upload stopped on name conflicts");
            return Ok(UploadOutcome::ConflictDetected { names: conflicts });
        }

        let mut written: Vec<Written> = Vec::new();
        let mut results = Vec::with_capacity(files.len());

        for file in files {
            let file_name = file.name.clone();
            match self
                .store_one(actor, &request, &category, &dir, file, &mut written)
                .await
            {
                Ok(outcome) => results.push(outcome),
                Err(BatchAbort(message)) => {
                    tracing::error!(
                        file_name = %file_name,
                        error = %message,
                        written = written.len(),
                        "Upload batch failed, rolling back"
                    );
                    self.roll_back(written).await;
                    return Ok(Self::general_error(Some(file_name), message));
                }
            }
        }

        self.commit(written).await;

        tracing::info!(
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            total = results.len(),
            "Upload batch finished"
        );

        Ok(UploadOutcome::Completed { results })
    }

    async fn occupancy(&self, path: &Path) -> Result<Occupancy, BatchAbort> {
        let on_disk = self.ctx.storage.exists(path).await?;
        let tracked = self
            .ctx
            .attachments
            .find_active_by_path(&path_string(path))
            .await?;
        Ok(Occupancy { on_disk, tracked })
    }

    fn general_error(file_name: Option<String>, message: String) -> UploadOutcome {
        UploadOutcome::Completed {
            results: vec![FileOutcome::GeneralError { file_name, message }],
        }
    }

    async fn store_one(
        &self,
        actor: &Actor,
        request: &UploadRequest,
        category: &Category,
        dir: &Path,
        file: UploadFile,
        written: &mut Vec<Written>,
    ) -> Result<FileOutcome, BatchAbort> {
        let UploadFile { name, reader } = file;

        let path = match self.ctx.resolver.file_path(dir, &name) {
            Ok(path) => path,
            Err(e) => {
                return Ok(FileOutcome::ValidationError {
                    file_name: name,
                    message: e.to_string(),
                })
            }
        };

        if !category.accepts_file(&name) {
            tracing::warn!(file_name = %name, category = %category.key, "Extension not allowed");
            return Ok(FileOutcome::ValidationError {
                message: format!(
                    "File type of '{}' is not allowed in category '{}' (allowed: {})",
                    name,
                    category.key,
                    category.allowed_extensions.join(", ")
                ),
                file_name: name,
            });
        }

        // Re-checked per file: an earlier file of this batch may have taken the name.
        let occupancy = self.occupancy(&path).await?;
        if occupancy.is_free() {
            return self
                .store_new(actor, request, category, path, name, None, reader, written)
                .await;
        }

        match request.strategy {
            None => Ok(FileOutcome::ValidationError {
                file_name: name,
                message: "A file with this name already exists".to_string(),
            }),
            Some(ConflictStrategy::Skip) => {
                tracing::debug!(file_name = %name, "Skipping existing file");
                Ok(FileOutcome::Skipped { file_name: name })
            }
            Some(ConflictStrategy::Rename) => {
                for n in 1..=MAX_RENAME_ATTEMPTS {
                    let candidate = numbered_name(&name, n);
                    let candidate_path = match self.ctx.resolver.file_path(dir, &candidate) {
                        Ok(path) => path,
                        Err(e) => {
                            return Ok(FileOutcome::ValidationError {
                                file_name: name,
                                message: e.to_string(),
                            })
                        }
                    };
                    if self.occupancy(&candidate_path).await?.is_free() {
                        return self
                            .store_new(
                                actor,
                                request,
                                category,
                                candidate_path,
                                candidate,
                                Some(name),
                                reader,
                                written,
                            )
                            .await;
                    }
                }
                Ok(FileOutcome::ValidationError {
                    file_name: name,
                    message: format!("No free name found after {} attempts", MAX_RENAME_ATTEMPTS),
                })
            }
            Some(ConflictStrategy::Overwrite) => {
                self.overwrite(actor, request, category, path, name, occupancy, reader, written)
                    .await
            }
        }
    }

    /// Write a file that did not exist, then record it. A failed insert
    /// removes the bytes again.
    #[allow(clippy::too_many_arguments)]
    async fn store_new(
        &self,
        actor: &Actor,
        request: &UploadRequest,
        category: &Category,
        path: PathBuf,
        file_name: String,
        original_name: Option<String>,
        reader: UploadReader,
        written: &mut Vec<Written>,
    ) -> Result<FileOutcome, BatchAbort> {
        let input_name = original_name.clone().unwrap_or_else(|| file_name.clone());

        let size = match self
            .ctx
            .storage
            .write_stream(&path, reader, Some(self.max_file_size_bytes))
            .await
        {
            Ok(size) => size,
            Err(StorageError::TooLarge { limit }) => {
                return Ok(FileOutcome::ValidationError {
                    file_name: input_name,
                    message: format!("File exceeds the maximum size of {} bytes", limit),
                })
            }
            Err(e) => return Err(BatchAbort(format!("Failed to write {}: {}", file_name, e))),
        };

        let storage_path = path_string(&path);
        let new = NewAttachment {
            record_id: request.record_id,
            sub_scope_id: request.sub_scope_id,
            file_name: file_name.clone(),
            storage_path: storage_path.clone(),
            size_bytes: size_as_i64(size),
            category_id: category.id,
            uploaded_by: actor.name.clone(),
            uploaded_at: Utc::now(),
        };

        let attachment = match self.ctx.attachments.insert(new).await {
            Ok(attachment) => attachment,
            Err(AppError::Conflict(reason)) => {
                // A concurrent upload of the same name was recorded first. The
                // bytes on disk are whichever write finished last, so they stay
                // and the existing row is brought in line with them.
                tracing::warn!(
                    storage_path = %storage_path,
                    reason = %reason,
                    "Name taken by a concurrent upload, recording over it"
                );
                return Ok(self
                    .record_over_concurrent(actor, path, file_name, original_name, size)
                    .await);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    storage_path = %storage_path,
                    "Failed to record upload, removing written file"
                );
                self.discard(&path).await;
                return Ok(FileOutcome::DatabaseError {
                    file_name: input_name,
                    message: e.to_string(),
                });
            }
        };

        written.push(Written::Created {
            attachment_id: attachment.id,
            path: path.clone(),
        });

        let detail = match &original_name {
            Some(original) => format!(
                "Uploaded {} as {} ({} bytes, renamed on conflict)",
                original, file_name, size
            ),
            None => format!("Uploaded {} ({} bytes)", file_name, size),
        };
        self.ctx
            .audit
            .record(attachment.id, AuditAction::Upload, detail, actor)
            .await;

        tracing::info!(
            attachment_id = %attachment.id,
            storage_path = %storage_path,
            size_bytes = size,
            "Attachment stored"
        );

        Ok(FileOutcome::Success(StoredFile {
            attachment_id: attachment.id,
            display_path: self.ctx.resolver.display_path(&storage_path),
            file_name,
            original_name,
            size_bytes: size,
            storage_path,
            overwritten: false,
        }))
    }

    /// Refresh the row of a concurrent upload that claimed `path` between our
    /// write and our insert. Not part of the batch rollback: the bytes on
    /// disk may belong to either writer.
    async fn record_over_concurrent(
        &self,
        actor: &Actor,
        path: PathBuf,
        file_name: String,
        original_name: Option<String>,
        written_size: u64,
    ) -> FileOutcome {
        let storage_path = path_string(&path);
        let input_name = original_name.clone().unwrap_or_else(|| file_name.clone());

        let winner = match self.ctx.attachments.find_active_by_path(&storage_path).await {
            Ok(Some(winner)) => winner,
            Ok(None) => {
                // The competing row is gone again; our bytes are untracked.
                self.discard(&path).await;
                return FileOutcome::DatabaseError {
                    file_name: input_name,
                    message: "Destination changed while recording the upload".to_string(),
                };
            }
            Err(e) => {
                return FileOutcome::DatabaseError {
                    file_name: input_name,
                    message: e.to_string(),
                }
            }
        };

        // The last write may have been the other upload's.
        let size = self
            .ctx
            .storage
            .content_length(&path)
            .await
            .unwrap_or(written_size);

        let attachment = match self
            .ctx
            .attachments
            .record_overwrite(winner.id, size_as_i64(size), &actor.name, Utc::now())
            .await
        {
            Ok(attachment) => attachment,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    storage_path = %storage_path,
                    "Failed to record over concurrent upload"
                );
                return FileOutcome::DatabaseError {
                    file_name: input_name,
                    message: e.to_string(),
                };
            }
        };

        self.ctx
            .audit
            .record(
                attachment.id,
                AuditAction::Overwrite,
                format!(
                    "Overwrote {} uploaded concurrently by {} ({} -> {} bytes)",
                    file_name, winner.uploaded_by, winner.size_bytes, size
                ),
                actor,
            )
            .await;

        FileOutcome::Success(StoredFile {
            attachment_id: attachment.id,
            display_path: self.ctx.resolver.display_path(&storage_path),
            file_name,
            original_name,
            size_bytes: size,
            storage_path,
            overwritten: true,
        })
    }

    /// Replace existing bytes and refresh the tracking row, keeping the
    /// attachment's identity. The previous bytes are kept aside until the
    /// batch finishes so a failed row update can put them back.
    #[allow(clippy::too_many_arguments)]
    async fn overwrite(
        &self,
        actor: &Actor,
        request: &UploadRequest,
        category: &Category,
        path: PathBuf,
        file_name: String,
        occupancy: Occupancy,
        reader: UploadReader,
        written: &mut Vec<Written>,
    ) -> Result<FileOutcome, BatchAbort> {
        let storage_path = path_string(&path);
        let Occupancy { on_disk, tracked: existing } = occupancy;

        let backup = if on_disk {
            let backup = self.ctx.storage.sibling_temp_path(&path, BACKUP_TAG);
            self.ctx.storage.copy(&path, &backup).await?;
            Some(backup)
        } else {
            tracing::warn!(
                storage_path = %storage_path,
                "Tracked file is missing from disk, writing it again"
            );
            None
        };

        let size = match self
            .ctx
            .storage
            .write_stream(&path, reader, Some(self.max_file_size_bytes))
            .await
        {
            Ok(size) => size,
            Err(StorageError::TooLarge { limit }) => {
                self.discard_backup(backup.as_deref()).await;
                return Ok(FileOutcome::ValidationError {
                    file_name,
                    message: format!("File exceeds the maximum size of {} bytes", limit),
                });
            }
            Err(e) => {
                self.discard_backup(backup.as_deref()).await;
                return Err(BatchAbort(format!("Failed to write {}: {}", file_name, e)));
            }
        };

        let now = Utc::now();
        let recorded = match &existing {
            Some(previous) => {
                self.ctx
                    .attachments
                    .record_overwrite(previous.id, size_as_i64(size), &actor.name, now)
                    .await
            }
            None => {
                tracing::warn!(
                    storage_path = %storage_path,
                    "Overwriting an untracked file, adopting it as a new attachment"
                );
                self.ctx
                    .attachments
                    .insert(NewAttachment {
                        record_id: request.record_id,
                        sub_scope_id: request.sub_scope_id,
                        file_name: file_name.clone(),
                        storage_path: storage_path.clone(),
                        size_bytes: size_as_i64(size),
                        category_id: category.id,
                        uploaded_by: actor.name.clone(),
                        uploaded_at: now,
                    })
                    .await
            }
        };

        let attachment = match recorded {
            Ok(attachment) => attachment,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    storage_path = %storage_path,
                    "Failed to record overwrite, restoring previous file"
                );
                self.restore(backup.as_deref(), &path).await;
                return Ok(FileOutcome::DatabaseError {
                    file_name,
                    message: e.to_string(),
                });
            }
        };

        let (action, detail) = match &existing {
            Some(previous) => (
                AuditAction::Overwrite,
                format!(
                    "Overwrote {} previously uploaded by {} at {} ({} -> {} bytes)",
                    file_name,
                    previous.uploaded_by,
                    previous.uploaded_at.to_rfc3339(),
                    previous.size_bytes,
                    size
                ),
            ),
            None => (
                AuditAction::Upload,
                format!("Uploaded {} over an untracked file ({} bytes)", file_name, size),
            ),
        };

        written.push(Written::Replaced {
            attachment_id: attachment.id,
            path: path.clone(),
            backup,
            previous: existing,
        });

        self.ctx
            .audit
            .record(attachment.id, action, detail, actor)
            .await;

        tracing::info!(
            attachment_id = %attachment.id,
            storage_path = %storage_path,
            size_bytes = size,
            "Attachment overwritten"
        );

        Ok(FileOutcome::Success(StoredFile {
            attachment_id: attachment.id,
            display_path: self.ctx.resolver.display_path(&storage_path),
            file_name,
            original_name: None,
            size_bytes: size,
            storage_path,
            overwritten: true,
        }))
    }

    /// Drop the backups of a batch that completed.
    async fn commit(&self, written: Vec<Written>) {
        for entry in written {
            if let Written::Replaced { backup, .. } = entry {
                self.discard_backup(backup.as_deref()).await;
            }
        }
    }

    /// Undo every file of a failed batch, newest first.
    async fn roll_back(&self, written: Vec<Written>) {
        let system = Actor::system();

        for entry in written.into_iter().rev() {
            match entry {
                Written::Created {
                    attachment_id,
                    path,
                } => {
                    self.discard(&path).await;
                    self.soft_delete(attachment_id, &path, &system).await;
                }
                Written::Replaced {
                    attachment_id,
                    path,
                    backup,
                    previous,
                } => {
                    self.restore(backup.as_deref(), &path).await;
                    match previous {
                        Some(previous) => {
                            match self
                                .ctx
                                .attachments
                                .record_overwrite(
                                    previous.id,
                                    previous.size_bytes,
                                    &previous.uploaded_by,
                                    previous.uploaded_at,
                                )
                                .await
                            {
                                Ok(_) => {
                                    self.ctx
                                        .audit
                                        .record(
                                            attachment_id,
                                            AuditAction::Overwrite,
                                            "Restored previous version after failed upload batch",
                                            &system,
                                        )
                                        .await;
                                }
                                Err(e) => tracing::error!(
                                    error = %e,
                                    attachment_id = %attachment_id,
                                    "Failed to restore attachment row"
                                ),
                            }
                        }
                        None => self.soft_delete(attachment_id, &path, &system).await,
                    }
                }
            }
        }
    }

    async fn soft_delete(&self, attachment_id: Uuid, path: &Path, actor: &Actor) {
        match self
            .ctx
            .attachments
            .soft_delete_by_path(&path_string(path), &actor.name)
            .await
        {
            Ok(_) => {
                self.ctx
                    .audit
                    .record(
                        attachment_id,
                        AuditAction::Delete,
                        "Removed after failed upload batch",
                        actor,
                    )
                    .await;
            }
            Err(e) => tracing::error!(
                error = %e,
                attachment_id = %attachment_id,
                "Failed to retire attachment row during rollback"
            ),
        }
    }

    /// Compensating delete. Failures are logged, never escalated.
    async fn discard(&self, path: &Path) {
        if let Err(e) = self.ctx.storage.delete(path).await {
            tracing::error!(error = %e, path = %path.display(), "Compensating delete failed");
        }
    }

    async fn discard_backup(&self, backup: Option<&Path>) {
        if let Some(backup) = backup {
            self.discard(backup).await;
        }
    }

    /// Put backed-up bytes back in place and drop the backup. Without a
    /// backup there were no previous bytes, so the new ones are removed.
    async fn restore(&self, backup: Option<&Path>, path: &Path) {
        let Some(backup) = backup else {
            self.discard(path).await;
            return;
        };
        match self.ctx.storage.copy(backup, path).await {
            Ok(()) => self.discard(backup).await,
            Err(e) => tracing::error!(
                error = %e,
                path = %path.display(),
                backup = %backup.display(),
                "Failed to restore previous file"
            ),
        }
    }
}

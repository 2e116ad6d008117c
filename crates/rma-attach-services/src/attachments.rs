//! Listing, deletion and the directory reconciliation view.

use rma_attach_core::models::{AttachmentFilter, AttachmentWithCategory, AuditAction};
use rma_attach_core::{Actor, AppError};
use rma_attach_storage::local::BACKUP_TAG;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::context::EngineContext;

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: AttachmentWithCategory,
    pub display_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingFile {
    pub attachment_id: Uuid,
    pub file_name: String,
}

/// Differences between one directory and the rows that point into it.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub directory: String,
    pub display_directory: String,
    /// Files on disk with no active row.
    pub untracked: Vec<String>,
    /// Active rows whose file is gone.
    pub missing: Vec<MissingFile>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.untracked.is_empty() && self.missing.is_empty()
    }
}

#[derive(Clone)]
pub struct AttachmentService {
    ctx: EngineContext,
}

impl AttachmentService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Active attachments for a record, optionally narrowed to a sub-scope
    /// and category, ordered by file name.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &AttachmentFilter) -> Result<Vec<AttachmentView>, AppError> {
        let rows = self.ctx.attachments.list(filter).await?;
        Ok(rows
            .into_iter()
            .map(|attachment| AttachmentView {
                display_path: self
                    .ctx
                    .resolver
                    .display_path(&attachment.attachment.storage_path),
                attachment,
            })
            .collect())
    }

    /// Remove the file at `storage_path` and soft-delete its row.
    ///
    /// Returns false when no active attachment is stored there. The file is
    /// set aside first so a failed row update can put it back.
    #[tracing::instrument(skip(self), fields(actor = %actor))]
    pub async fn delete_by_path(&self, actor: &Actor, storage_path: &str) -> Result<bool, AppError> {
        self.ctx.require_upload(actor).await?;

        let Some(attachment) = self.ctx.attachments.find_active_by_path(storage_path).await? else {
            return Ok(false);
        };

        let path = Path::new(storage_path);
        let aside = self.ctx.storage.sibling_temp_path(path, BACKUP_TAG);
        let set_aside = if self.ctx.storage.exists(path).await? {
            self.ctx.storage.rename(path, &aside).await?;
            true
        } else {
            tracing::warn!(storage_path, "Deleting attachment whose file is already gone");
            false
        };

        if let Err(e) = self
            .ctx
            .attachments
            .soft_delete_by_path(storage_path, &actor.name)
            .await
        {
            if set_aside {
                if let Err(restore) = self.ctx.storage.rename(&aside, path).await {
                    tracing::error!(error = %restore, storage_path, "Failed to put file back after delete failure");
                }
            }
            return Err(e);
        }

        if set_aside {
            if let Err(e) = self.ctx.storage.delete(&aside).await {
                tracing::error!(error = %e, path = %aside.display(), "Failed to remove deleted file");
            }
        }

        self.ctx
            .audit
            .record(
                attachment.id,
                AuditAction::Delete,
                format!("Deleted {}", attachment.file_name),
                actor,
            )
            .await;

        tracing::info!(attachment_id = %attachment.id, storage_path, "Attachment deleted");
        Ok(true)
    }

    /// Compare a category directory with its tracking rows. Read-only and
    /// advisory: nothing is repaired.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
        category_key: &str,
    ) -> Result<ReconcileReport, AppError> {
        let category = self
            .ctx
            .categories
            .find_by_key(category_key)
            .await?
            .ok_or_else(|| AppError::InvalidInput(format!("Unknown category '{}'", category_key)))?;
        let dir = self.ctx.resolver.resolve(record_id, sub_scope_id, &category)?;

        let on_disk: HashSet<String> = self.ctx.storage.list_files(&dir).await?.into_iter().collect();
        let rows = self
            .ctx
            .attachments
            .list(&AttachmentFilter {
                record_id,
                sub_scope_id: Some(sub_scope_id),
                category_key: Some(category.key.clone()),
            })
            .await?;

        let tracked: HashSet<&str> = rows
            .iter()
            .map(|r| r.attachment.file_name.as_str())
            .collect();

        let mut untracked: Vec<String> = on_disk
            .iter()
            .filter(|name| !tracked.contains(name.as_str()))
            .cloned()
            .collect();
        untracked.sort();

        let missing: Vec<MissingFile> = rows
            .iter()
            .filter(|r| !on_disk.contains(&r.attachment.file_name))
            .map(|r| MissingFile {
                attachment_id: r.attachment.id,
                file_name: r.attachment.file_name.clone(),
            })
            .collect();

        if !untracked.is_empty() || !missing.is_empty() {
            tracing::warn!(
                dir = %dir.display(),
                untracked = untracked.len(),
                missing = missing.len(),
                "Directory and tracking rows disagree"
            );
        }

        let directory = dir.to_string_lossy().into_owned();
        Ok(ReconcileReport {
            display_directory: self.ctx.resolver.display_path(&directory),
            directory,
            untracked,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TestEngine, DISPLAY_ROOT};
    use rma_attach_db::AttachmentStore;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_list_filters_and_display_paths() {
        let engine = TestEngine::new().await;
        engine.seed_file(1, "docs", "b.txt", b"b").await;
        engine.seed_file(1, "docs", "a.txt", b"a").await;
        engine
            .seed_scoped_file(1, Some(10), "logs", "trace.log", b"l")
            .await;
        engine.seed_file(2, "docs", "other.txt", b"o").await;

        let all = engine
            .attachments
            .list(&AttachmentFilter::for_record(1))
            .await
            .unwrap();
        let names: Vec<&str> = all
            .iter()
            .map(|v| v.attachment.attachment.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "trace.log"]);
        assert!(all.iter().all(|v| v.display_path.starts_with(DISPLAY_ROOT)));

        let header_only = engine
            .attachments
            .list(&AttachmentFilter {
                record_id: 1,
                sub_scope_id: Some(None),
                category_key: None,
            })
            .await
            .unwrap();
        assert_eq!(header_only.len(), 2);

        let line = engine
            .attachments
            .list(&AttachmentFilter {
                record_id: 1,
                sub_scope_id: Some(Some(10)),
                category_key: Some("logs".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(line.len(), 1);
        assert_eq!(line[0].attachment.category_key, "logs");
    }

    #[tokio::test]
    async fn test_delete_by_path() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"a").await;
        let bob = Actor::user("bob");

        assert!(engine
            .attachments
            .delete_by_path(&bob, &seeded.storage_path)
            .await
            .unwrap());

        let dir = engine.dir(1, None, "docs");
        assert!(engine.files_in(&dir).is_empty());

        let row = engine.attachment_store.get(seeded.id).await.unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.deleted_by.as_deref(), Some("bob"));

        let trail = engine.ctx.audit.trail(seeded.id).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::Delete);

        // Nothing active there any more.
        assert!(!engine
            .attachments
            .delete_by_path(&bob, &seeded.storage_path)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"a").await;
        std::fs::remove_file(&seeded.storage_path).unwrap();

        assert!(engine
            .attachments
            .delete_by_path(&Actor::user("alice"), &seeded.storage_path)
            .await
            .unwrap());
        assert!(engine.active_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_row_failure_keeps_file() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"a").await;
        engine.faults.fail_soft_delete.store(true, Ordering::SeqCst);

        let result = engine
            .attachments
            .delete_by_path(&Actor::user("alice"), &seeded.storage_path)
            .await;

        assert!(result.is_err());
        assert_eq!(
            engine.files_in(&engine.dir(1, None, "docs")),
            vec!["a.txt"]
        );
        assert_eq!(engine.active_rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_requires_upload_capability() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"a").await;

        let result = engine
            .attachments
            .delete_by_path(&Actor::user("mallory"), &seeded.storage_path)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(Path::new(&seeded.storage_path).exists());
    }

    #[tokio::test]
    async fn test_reconcile_reports_both_directions() {
        let engine = TestEngine::new().await;
        engine.seed_file(1, "docs", "tracked.txt", b"t").await;
        let gone = engine.seed_file(1, "docs", "gone.txt", b"g").await;
        std::fs::remove_file(&gone.storage_path).unwrap();
        engine
            .write_untracked(1, None, "docs", "stray.txt", b"s")
            .await;

        let report = engine.attachments.reconcile(1, None, "docs").await.unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.untracked, vec!["stray.txt"]);
        assert_eq!(
            report.missing,
            vec![MissingFile {
                attachment_id: gone.id,
                file_name: "gone.txt".to_string(),
            }]
        );
        assert!(report.display_directory.starts_with(DISPLAY_ROOT));

        // Advisory only: nothing was touched.
        assert!(engine.dir(1, None, "docs").join("stray.txt").exists());
        assert_eq!(engine.active_rows().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_empty_directory_is_consistent() {
        let engine = TestEngine::new().await;
        let report = engine
            .attachments
            .reconcile(3, None, "docs")
            .await
            .unwrap();
        assert!(report.is_consistent());
    }
}

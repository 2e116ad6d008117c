//! Moving attachments between records, sub-scopes and categories.
//!
//! The file is moved before the row is updated. A failed move leaves the row
//! untouched; a failed row update moves the file back.

use rma_attach_core::models::{Attachment, AttachmentLocation, AuditAction, Category};
use rma_attach_core::{Actor, AppError, ErrorMetadata};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::collaborators::RecordValidator;
use crate::context::EngineContext;

/// Destination of a relocation. A missing category keeps the current one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelocationTarget {
    pub record_id: i64,
    #[serde(default)]
    pub sub_scope_id: Option<i64>,
    #[serde(default)]
    pub category_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelocationResult {
    pub attachment: Attachment,
    /// False when the target already matched the current location.
    pub changed: bool,
    pub display_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRelocationError {
    pub attachment_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkRelocationResult {
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<BulkRelocationError>,
}

#[derive(Clone)]
pub struct RelocationService {
    ctx: EngineContext,
    records: Arc<dyn RecordValidator>,
}

impl RelocationService {
    pub fn new(ctx: EngineContext, records: Arc<dyn RecordValidator>) -> Self {
        Self { ctx, records }
    }

    #[tracing::instrument(skip(self, target), fields(actor = %actor, target_record = target.record_id))]
    pub async fn relocate(
        &self,
        actor: &Actor,
        attachment_id: Uuid,
        target: &RelocationTarget,
    ) -> Result<RelocationResult, AppError> {
        self.ctx.require_edit_metadata(actor).await?;
        self.relocate_one(actor, attachment_id, target).await
    }

    /// Apply one target to many attachments, continuing past failures.
    #[tracing::instrument(skip(self, ids, target), fields(actor = %actor, count = ids.len()))]
    pub async fn relocate_bulk(
        &self,
        actor: &Actor,
        ids: &[Uuid],
        target: &RelocationTarget,
    ) -> Result<BulkRelocationResult, AppError> {
        self.ctx.require_edit_metadata(actor).await?;

        let mut result = BulkRelocationResult::default();
        for &id in ids {
            match self.relocate_one(actor, id, target).await {
                Ok(r) if r.changed => result.updated += 1,
                Ok(_) => result.skipped += 1,
                Err(e) => {
                    tracing::warn!(attachment_id = %id, error = %e, "Bulk relocation item failed");
                    result.errors.push(BulkRelocationError {
                        attachment_id: id,
                        message: e.client_message(),
                    });
                }
            }
        }

        tracing::info!(
            updated = result.updated,
            skipped = result.skipped,
            failed = result.errors.len(),
            "Bulk relocation finished"
        );
        Ok(result)
    }

    async fn relocate_one(
        &self,
        actor: &Actor,
        attachment_id: Uuid,
        target: &RelocationTarget,
    ) -> Result<RelocationResult, AppError> {
        let attachment = self
            .ctx
            .attachments
            .get(attachment_id)
            .await?
            .filter(|a| a.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", attachment_id)))?;

        let validation = self
            .records
            .validate(target.record_id, target.sub_scope_id)
            .await?;
        if !validation.is_valid() {
            return Err(AppError::InvalidInput(validation.error_message.unwrap_or_else(
                || format!("Record {} is not a valid target", target.record_id),
            )));
        }

        let current_category = self.category_by_id(attachment.category_id).await?;
        let category = match &target.category_key {
            Some(key) if *key != current_category.key => self.ctx.active_category(key).await?,
            _ => current_category.clone(),
        };
        if category.id != current_category.id && !category.accepts_file(&attachment.file_name) {
            return Err(AppError::InvalidInput(format!(
                "File type of '{}' is not allowed in category '{}'",
                attachment.file_name, category.key
            )));
        }

        let dir = self
            .ctx
            .resolver
            .resolve(target.record_id, target.sub_scope_id, &category)?;
        let new_path = self.ctx.resolver.file_path(&dir, &attachment.file_name)?;
        let location = AttachmentLocation {
            record_id: target.record_id,
            sub_scope_id: target.sub_scope_id,
            category_id: category.id,
            storage_path: new_path.to_string_lossy().into_owned(),
        };

        if location == attachment.location() {
            return Ok(RelocationResult {
                display_path: self.ctx.resolver.display_path(&attachment.storage_path),
                attachment,
                changed: false,
            });
        }

        let old_path = Path::new(&attachment.storage_path);
        let moves_file = location.storage_path != attachment.storage_path;

        if moves_file {
            if self.ctx.storage.exists(&new_path).await? {
                return Err(AppError::Conflict(format!(
                    "A file named {} already exists at the destination",
                    attachment.file_name
                )));
            }
            self.ctx.storage.rename(old_path, &new_path).await?;
        }

        let updated = match self.ctx.attachments.relocate(attachment.id, &location).await {
            Ok(updated) => updated,
            Err(e) => {
                if moves_file {
                    tracing::error!(
                        error = %e,
                        attachment_id = %attachment.id,
                        "Failed to update attachment row, moving file back"
                    );
                    if let Err(move_back) = self.ctx.storage.rename(&new_path, old_path).await {
                        tracing::error!(
                            error = %move_back,
                            from = %new_path.display(),
                            to = %attachment.storage_path,
                            "Failed to move file back after relocation failure"
                        );
                    }
                }
                return Err(e);
            }
        };

        let (action, detail) = describe_changes(&attachment, &current_category, &updated, &category);
        self.ctx.audit.record(updated.id, action, detail, actor).await;

        tracing::info!(
            attachment_id = %updated.id,
            from = %attachment.storage_path,
            to = %updated.storage_path,
            "Attachment relocated"
        );

        Ok(RelocationResult {
            display_path: self.ctx.resolver.display_path(&updated.storage_path),
            attachment: updated,
            changed: true,
        })
    }

    async fn category_by_id(&self, id: Uuid) -> Result<Category, AppError> {
        self.ctx
            .categories
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Category {} of attachment is missing", id)))
    }
}

fn scope_label(sub_scope_id: Option<i64>) -> String {
    sub_scope_id.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// One audit line naming every changed field. A pure category change is
/// logged as such; anything else is a metadata move.
fn describe_changes(
    before: &Attachment,
    before_category: &Category,
    after: &Attachment,
    after_category: &Category,
) -> (AuditAction, String) {
    let mut changes = Vec::new();
    if before.record_id != after.record_id {
        changes.push(format!("record {} -> {}", before.record_id, after.record_id));
    }
    if before.sub_scope_id != after.sub_scope_id {
        changes.push(format!(
            "line {} -> {}",
            scope_label(before.sub_scope_id),
            scope_label(after.sub_scope_id)
        ));
    }
    let category_changed = before.category_id != after.category_id;
    if category_changed {
        changes.push(format!(
            "category {} -> {}",
            before_category.key, after_category.key
        ));
    }
    let only_category = category_changed && changes.len() == 1;
    if before.storage_path != after.storage_path {
        changes.push(format!("path {} -> {}", before.storage_path, after.storage_path));
    }

    let action = if only_category {
        AuditAction::CategoryChange
    } else {
        AuditAction::MetadataMove
    };
    (action, changes.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestEngine;
    use rma_attach_db::AttachmentStore;
    use std::sync::atomic::Ordering;

    fn target(record_id: i64, sub_scope_id: Option<i64>, category: Option<&str>) -> RelocationTarget {
        RelocationTarget {
            record_id,
            sub_scope_id,
            category_key: category.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_move_to_other_record() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"data").await;
        let alice = Actor::user("alice");

        let result = engine
            .relocations
            .relocate(&alice, seeded.id, &target(2, None, None))
            .await
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.attachment.id, seeded.id);
        assert_eq!(result.attachment.record_id, 2);

        let new_path = engine.dir(2, None, "docs").join("a.txt");
        assert_eq!(result.attachment.storage_path, new_path.to_string_lossy());
        assert_eq!(std::fs::read(&new_path).unwrap(), b"data");
        assert!(!Path::new(&seeded.storage_path).exists());

        let trail = engine.ctx.audit.trail(seeded.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::MetadataMove);
        assert!(trail[0].detail.contains("record 1 -> 2"));
        assert_eq!(trail[0].actor, "alice");
    }

    #[tokio::test]
    async fn test_invalid_target_leaves_everything_unchanged() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"data").await;
        let alice = Actor::user("alice");

        let missing_record = engine
            .relocations
            .relocate(&alice, seeded.id, &target(99, None, None))
            .await;
        assert!(matches!(missing_record, Err(AppError::InvalidInput(_))));

        let foreign_line = engine
            .relocations
            .relocate(&alice, seeded.id, &target(1, Some(20), Some("logs")))
            .await;
        assert!(matches!(foreign_line, Err(AppError::InvalidInput(_))));

        // Header category cannot be filed under a line.
        let wrong_level = engine
            .relocations
            .relocate(&alice, seeded.id, &target(1, Some(10), None))
            .await;
        assert!(matches!(wrong_level, Err(AppError::InvalidInput(_))));

        assert!(Path::new(&seeded.storage_path).exists());
        let row = engine.attachment_store.get(seeded.id).await.unwrap().unwrap();
        assert_eq!(row, seeded);
        assert!(engine.audit_log.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_category_change_is_audited_as_such() {
        let engine = TestEngine::new().await;
        let photo = engine.seed_file(1, "docs", "dent.jpg", b"jpg").await;
        let pdf = engine.seed_file(1, "docs", "invoice.pdf", b"pdf").await;
        let alice = Actor::user("alice");

        let result = engine
            .relocations
            .relocate(&alice, photo.id, &target(1, None, Some("photos")))
            .await
            .unwrap();
        let photos = engine.category("photos").await;
        assert_eq!(result.attachment.category_id, photos.id);
        assert!(engine.dir(1, None, "photos").join("dent.jpg").exists());

        let trail = engine.ctx.audit.trail(photo.id).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::CategoryChange);
        assert!(trail[0].detail.contains("category docs -> photos"));

        let rejected = engine
            .relocations
            .relocate(&alice, pdf.id, &target(1, None, Some("photos")))
            .await;
        assert!(matches!(rejected, Err(AppError::InvalidInput(_))));
        assert!(Path::new(&pdf.storage_path).exists());
    }

    #[tokio::test]
    async fn test_move_to_line_with_line_category() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "trace.txt", b"t").await;

        let result = engine
            .relocations
            .relocate(
                &Actor::user("alice"),
                seeded.id,
                &target(1, Some(11), Some("logs")),
            )
            .await
            .unwrap();

        assert_eq!(result.attachment.sub_scope_id, Some(11));
        assert!(engine.dir(1, Some(11), "logs").join("trace.txt").exists());
        let trail = engine.ctx.audit.trail(seeded.id).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::MetadataMove);
        assert!(trail[0].detail.contains("line none -> 11"));
    }

    #[tokio::test]
    async fn test_existing_destination_is_a_conflict() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"mine").await;
        let blocker = engine
            .write_untracked(2, None, "docs", "a.txt", b"theirs")
            .await;

        let result = engine
            .relocations
            .relocate(&Actor::user("alice"), seeded.id, &target(2, None, None))
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(std::fs::read(&seeded.storage_path).unwrap(), b"mine");
        assert_eq!(std::fs::read(&blocker).unwrap(), b"theirs");
    }

    #[tokio::test]
    async fn test_row_failure_moves_file_back() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"data").await;
        engine.faults.fail_relocate.store(true, Ordering::SeqCst);

        let result = engine
            .relocations
            .relocate(&Actor::user("alice"), seeded.id, &target(2, None, None))
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(&seeded.storage_path).unwrap(), b"data");
        assert!(engine
            .files_in(&engine.dir(2, None, "docs"))
            .is_empty());
        let row = engine.attachment_store.get(seeded.id).await.unwrap().unwrap();
        assert_eq!(row.record_id, 1);
    }

    #[tokio::test]
    async fn test_same_location_is_unchanged() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"data").await;

        let result = engine
            .relocations
            .relocate(
                &Actor::user("alice"),
                seeded.id,
                &target(1, None, Some("docs")),
            )
            .await
            .unwrap();

        assert!(!result.changed);
        assert!(engine.audit_log.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_relocation_requires_edit_capability() {
        let engine = TestEngine::new().await;
        let seeded = engine.seed_file(1, "docs", "a.txt", b"data").await;

        let result = engine
            .relocations
            .relocate(&Actor::user("bob"), seeded.id, &target(2, None, None))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(Path::new(&seeded.storage_path).exists());
    }

    #[tokio::test]
    async fn test_bulk_relocation_counts() {
        let engine = TestEngine::new().await;
        let moving = engine.seed_file(1, "docs", "a.txt", b"a").await;
        let already = engine.seed_file(2, "docs", "b.txt", b"b").await;
        let unknown = Uuid::new_v4();

        let result = engine
            .relocations
            .relocate_bulk(
                &Actor::user("alice"),
                &[moving.id, already.id, unknown],
                &target(2, None, None),
            )
            .await
            .unwrap();

        assert_eq!(result.updated, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].attachment_id, unknown);
        assert!(engine.dir(2, None, "docs").join("a.txt").exists());
    }
}

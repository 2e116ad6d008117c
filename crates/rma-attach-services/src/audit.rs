use rma_attach_core::models::{AuditAction, AuditLogEntry, NewAuditEntry};
use rma_attach_core::{Actor, AppError};
use rma_attach_db::AuditLogStore;
use std::sync::Arc;
use uuid::Uuid;

/// Writes and reads the attachment audit trail.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditLogStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    /// Append an entry. A failure is logged and swallowed: the mutation it
    /// describes has already been committed.
    pub async fn record(
        &self,
        attachment_id: Uuid,
        action: AuditAction,
        detail: impl Into<String>,
        actor: &Actor,
    ) -> Option<AuditLogEntry> {
        let entry = NewAuditEntry {
            attachment_id,
            action,
            detail: detail.into(),
            actor: actor.name.clone(),
            is_system: actor.is_system,
        };
        match self.store.append(entry).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attachment_id = %attachment_id,
                    action = %action,
                    "Failed to append audit entry"
                );
                None
            }
        }
    }

    /// Entries for one attachment, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn trail(&self, attachment_id: Uuid) -> Result<Vec<AuditLogEntry>, AppError> {
        self.store.list_for_attachment(attachment_id).await
    }
}

//! In-memory repository implementations
//!
//! These stand in for the Postgres repositories in service and API tests. They
//! honour the same constraints the schema enforces (one active attachment per
//! path, reclaim-once tokens).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rma_attach_core::models::{
    Attachment, AttachmentFilter, AttachmentLocation, AttachmentWithCategory, AuditLogEntry,
    Category, NewAttachment, NewAuditEntry, NewTempToken, ScopeLevel, TempToken,
};
use rma_attach_core::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::traits::{AttachmentStore, AuditLogStore, CategoryProvider, TempTokenStore};

/// In-memory category table
#[derive(Clone, Default)]
pub struct InMemoryCategories {
    categories: Arc<RwLock<HashMap<Uuid, Category>>>,
}

impl InMemoryCategories {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories: Arc::new(RwLock::new(
                categories.into_iter().map(|c| (c.id, c)).collect(),
            )),
        }
    }

    pub async fn add(&self, category: Category) {
        self.categories.write().await.insert(category.id, category);
    }
}

#[async_trait]
impl CategoryProvider for InMemoryCategories {
    async fn categories_for(&self, scope: ScopeLevel) -> Result<Vec<Category>, AppError> {
        let mut categories: Vec<Category> = self
            .categories
            .read()
            .await
            .values()
            .filter(|c| c.scope == scope && c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(categories)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Category>, AppError> {
        Ok(self
            .categories
            .read()
            .await
            .values()
            .find(|c| c.key == key)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Category>, AppError> {
        Ok(self.categories.read().await.get(&id).cloned())
    }
}

/// In-memory attachment table
#[derive(Clone)]
pub struct InMemoryAttachments {
    rows: Arc<RwLock<HashMap<Uuid, Attachment>>>,
    categories: InMemoryCategories,
}

impl InMemoryAttachments {
    /// `categories` is consulted when listing, the way the SQL join does.
    pub fn new(categories: InMemoryCategories) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            categories,
        }
    }

    /// Every row, deleted ones included.
    pub async fn all(&self) -> Vec<Attachment> {
        self.rows.read().await.values().cloned().collect()
    }

    fn path_taken(rows: &HashMap<Uuid, Attachment>, path: &str, except: Option<Uuid>) -> bool {
        rows.values()
            .any(|a| !a.is_deleted && a.storage_path == path && Some(a.id) != except)
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachments {
    async fn find_active_by_path(
        &self,
        storage_path: &str,
    ) -> Result<Option<Attachment>, AppError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|a| !a.is_deleted && a.storage_path == storage_path)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>, AppError> {
        let rows = self.rows.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn insert(&self, new: NewAttachment) -> Result<Attachment, AppError> {
        let mut rows = self.rows.write().await;
        if Self::path_taken(&rows, &new.storage_path, None) {
            return Err(AppError::Conflict(format!(
                "An active attachment already exists at {}",
                new.storage_path
            )));
        }

        let attachment = Attachment {
            id: Uuid::new_v4(),
            record_id: new.record_id,
            sub_scope_id: new.sub_scope_id,
            file_name: new.file_name,
            storage_path: new.storage_path,
            size_bytes: new.size_bytes,
            category_id: new.category_id,
            uploaded_by: new.uploaded_by,
            uploaded_at: new.uploaded_at,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
        };
        rows.insert(attachment.id, attachment.clone());
        Ok(attachment)
    }

    async fn record_overwrite(
        &self,
        id: Uuid,
        size_bytes: i64,
        uploaded_by: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Attachment, AppError> {
        let mut rows = self.rows.write().await;
        let attachment = rows
            .get_mut(&id)
            .filter(|a| a.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))?;
        attachment.size_bytes = size_bytes;
        attachment.uploaded_by = uploaded_by.to_string();
        attachment.uploaded_at = uploaded_at;
        Ok(attachment.clone())
    }

    async fn relocate(
        &self,
        id: Uuid,
        location: &AttachmentLocation,
    ) -> Result<Attachment, AppError> {
        let mut rows = self.rows.write().await;
        if Self::path_taken(&rows, &location.storage_path, Some(id)) {
            return Err(AppError::Conflict(format!(
                "An active attachment already exists at {}",
                location.storage_path
            )));
        }
        let attachment = rows
            .get_mut(&id)
            .filter(|a| a.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Attachment {} not found", id)))?;
        attachment.record_id = location.record_id;
        attachment.sub_scope_id = location.sub_scope_id;
        attachment.category_id = location.category_id;
        attachment.storage_path = location.storage_path.clone();
        Ok(attachment.clone())
    }

    async fn soft_delete_by_path(
        &self,
        storage_path: &str,
        deleted_by: &str,
    ) -> Result<Option<Attachment>, AppError> {
        let mut rows = self.rows.write().await;
        let Some(attachment) = rows
            .values_mut()
            .find(|a| !a.is_deleted && a.storage_path == storage_path)
        else {
            return Ok(None);
        };
        attachment.is_deleted = true;
        attachment.deleted_by = Some(deleted_by.to_string());
        attachment.deleted_at = Some(Utc::now());
        Ok(Some(attachment.clone()))
    }

    async fn list(
        &self,
        filter: &AttachmentFilter,
    ) -> Result<Vec<AttachmentWithCategory>, AppError> {
        let categories = self.categories.categories.read().await;
        let rows = self.rows.read().await;

        let mut result: Vec<AttachmentWithCategory> = rows
            .values()
            .filter_map(|a| {
                let category = categories.get(&a.category_id)?;
                filter
                    .matches(a, &category.key)
                    .then(|| AttachmentWithCategory {
                        attachment: a.clone(),
                        category_key: category.key.clone(),
                        category_label: category.label.clone(),
                    })
            })
            .collect();
        result.sort_by(|a, b| a.attachment.file_name.cmp(&b.attachment.file_name));
        Ok(result)
    }
}

/// In-memory audit ledger
#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in insertion order.
    pub async fn all(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AppError> {
        let row = AuditLogEntry {
            id: Uuid::new_v4(),
            attachment_id: entry.attachment_id,
            action: entry.action,
            detail: entry.detail,
            actor: entry.actor,
            is_system: entry.is_system,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_for_attachment(
        &self,
        attachment_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.attachment_id == attachment_id)
            .cloned()
            .collect())
    }
}

/// In-memory temp token table
#[derive(Clone, Default)]
pub struct InMemoryTempTokens {
    tokens: Arc<RwLock<HashMap<String, TempToken>>>,
}

impl InMemoryTempTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a token's expiry, e.g. into the past.
    pub async fn set_expires_at(&self, token: &str, expires_at: DateTime<Utc>) -> bool {
        match self.tokens.write().await.get_mut(token) {
            Some(row) => {
                row.expires_at = expires_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TempTokenStore for InMemoryTempTokens {
    async fn insert(&self, new: NewTempToken) -> Result<TempToken, AppError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&new.token) {
            return Err(AppError::Conflict("Token already exists".to_string()));
        }
        let row = TempToken {
            id: Uuid::new_v4(),
            token: new.token,
            file_path: new.file_path,
            display_name: new.display_name,
            created_at: new.created_at,
            expires_at: new.expires_at,
            is_deleted: false,
            is_reclaimed: false,
        };
        tokens.insert(row.token.clone(), row.clone());
        Ok(row)
    }

    async fn find(&self, token: &str) -> Result<Option<TempToken>, AppError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        match self.tokens.write().await.get_mut(token) {
            Some(row) => {
                row.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reclaimable(&self, now: DateTime<Utc>) -> Result<Vec<TempToken>, AppError> {
        let mut rows: Vec<TempToken> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.is_reclaimable_at(now))
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.expires_at);
        Ok(rows)
    }

    async fn mark_reclaimed(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tokens = self.tokens.write().await;
        match tokens.values_mut().find(|t| t.id == id) {
            Some(row) if !row.is_reclaimed => {
                row.is_reclaimed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(key: &str) -> Category {
        Category {
            id: Uuid::new_v4(),
            key: key.to_string(),
            label: key.to_uppercase(),
            allowed_extensions: vec!["*".to_string()],
            scope: ScopeLevel::Header,
            is_active: true,
        }
    }

    fn new_attachment(category_id: Uuid, name: &str) -> NewAttachment {
        NewAttachment {
            record_id: 1,
            sub_scope_id: None,
            file_name: name.to_string(),
            storage_path: format!("/mnt/rma/RECORD_1/docs/{}", name),
            size_bytes: 10,
            category_id,
            uploaded_by: "alice".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_second_active_row_at_path() {
        let docs = category("docs");
        let store = InMemoryAttachments::new(InMemoryCategories::new(vec![docs.clone()]));

        store.insert(new_attachment(docs.id, "a.pdf")).await.unwrap();
        let second = store.insert(new_attachment(docs.id, "a.pdf")).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        store
            .soft_delete_by_path("/mnt/rma/RECORD_1/docs/a.pdf", "bob")
            .await
            .unwrap()
            .unwrap();
        assert!(store.insert(new_attachment(docs.id, "a.pdf")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_joins_category_and_sorts_by_name() {
        let docs = category("docs");
        let store = InMemoryAttachments::new(InMemoryCategories::new(vec![docs.clone()]));
        store.insert(new_attachment(docs.id, "b.pdf")).await.unwrap();
        store.insert(new_attachment(docs.id, "a.pdf")).await.unwrap();

        let listed = store.list(&AttachmentFilter::for_record(1)).await.unwrap();
        let names: Vec<_> = listed.iter().map(|a| a.attachment.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert_eq!(listed[0].category_key, "docs");
    }

    #[tokio::test]
    async fn test_mark_reclaimed_only_once() {
        let tokens = InMemoryTempTokens::new();
        let now = Utc::now();
        let row = tokens
            .insert(NewTempToken {
                token: "t".to_string(),
                file_path: "/tmp/a.zip".to_string(),
                display_name: "a.zip".to_string(),
                created_at: now,
                expires_at: now,
            })
            .await
            .unwrap();

        assert_eq!(tokens.list_reclaimable(now).await.unwrap().len(), 1);
        assert!(tokens.mark_reclaimed(row.id).await.unwrap());
        assert!(!tokens.mark_reclaimed(row.id).await.unwrap());
        assert!(tokens.list_reclaimable(now).await.unwrap().is_empty());
    }
}

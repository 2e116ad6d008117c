use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One physical file under tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Attachment {
    pub id: Uuid,
    pub record_id: i64,
    /// `None` means the attachment belongs to the record as a whole.
    pub sub_scope_id: Option<i64>,
    pub file_name: String,
    /// Absolute path; always the resolver's directory joined with `file_name`.
    pub storage_path: String,
    pub size_bytes: i64,
    pub category_id: Uuid,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attachment {
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Attachment with its category joined in, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AttachmentWithCategory {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub attachment: Attachment,
    pub category_key: String,
    pub category_label: String,
}

/// Values for a freshly tracked attachment.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub record_id: i64,
    pub sub_scope_id: Option<i64>,
    pub file_name: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub category_id: Uuid,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Where an attachment lives: the fields relocation changes together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLocation {
    pub record_id: i64,
    pub sub_scope_id: Option<i64>,
    pub category_id: Uuid,
    pub storage_path: String,
}

impl Attachment {
    pub fn location(&self) -> AttachmentLocation {
        AttachmentLocation {
            record_id: self.record_id,
            sub_scope_id: self.sub_scope_id,
            category_id: self.category_id,
            storage_path: self.storage_path.clone(),
        }
    }
}

/// Listing filter.
///
/// `sub_scope_id`: `None` = any level, `Some(None)` = record-level only,
/// `Some(Some(id))` = that sub-scope only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentFilter {
    pub record_id: i64,
    #[serde(default)]
    pub sub_scope_id: Option<Option<i64>>,
    #[serde(default)]
    pub category_key: Option<String>,
}

impl AttachmentFilter {
    pub fn for_record(record_id: i64) -> Self {
        Self {
            record_id,
            ..Default::default()
        }
    }

    pub fn matches(&self, attachment: &Attachment, category_key: &str) -> bool {
        if attachment.record_id != self.record_id || attachment.is_deleted {
            return false;
        }
        if let Some(sub_scope) = self.sub_scope_id {
            if attachment.sub_scope_id != sub_scope {
                return false;
            }
        }
        match &self.category_key {
            Some(key) => key == category_key,
            None => true,
        }
    }
}

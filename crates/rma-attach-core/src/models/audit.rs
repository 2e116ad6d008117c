use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Kind of mutation recorded in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "audit_action", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    Overwrite,
    Delete,
    CategoryChange,
    MetadataMove,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AuditAction::Upload => write!(f, "upload"),
            AuditAction::Overwrite => write!(f, "overwrite"),
            AuditAction::Delete => write!(f, "delete"),
            AuditAction::CategoryChange => write!(f, "category_change"),
            AuditAction::MetadataMove => write!(f, "metadata_move"),
        }
    }
}

/// Immutable ledger entry referencing one attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub attachment_id: Uuid,
    pub action: AuditAction,
    pub detail: String,
    pub actor: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub attachment_id: Uuid,
    pub action: AuditAction,
    pub detail: String,
    pub actor: String,
    pub is_system: bool,
}

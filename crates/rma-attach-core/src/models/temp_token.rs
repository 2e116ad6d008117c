use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral capability granting access to one generated file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TempToken {
    pub id: Uuid,
    pub token: String,
    pub file_path: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Explicitly revoked.
    pub is_deleted: bool,
    /// Backing file has been removed by a sweep.
    pub is_reclaimed: bool,
}

impl TempToken {
    /// Validity is gated on time and the revoke flag only, never on file existence.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted && now < self.expires_at
    }

    /// Expired or revoked, and the backing file not yet reclaimed.
    pub fn is_reclaimable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_reclaimed && !self.is_usable_at(now)
    }
}

#[derive(Debug, Clone)]
pub struct NewTempToken {
    pub token: String,
    pub file_path: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

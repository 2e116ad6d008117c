//! Interfaces to systems the engine consults but does not own: authorization,
//! RMA record lookups and the category catalogue.

use async_trait::async_trait;
use rma_attach_core::{Actor, AppError, Config};
use rma_attach_db::RecordRepository;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub use rma_attach_db::CategoryProvider;

const WILDCARD: &str = "*";

/// Boolean capability checks for an actor.
#[async_trait]
pub trait CapabilityChecker: Send + Sync {
    /// Upload and delete attachments.
    async fn can_upload(&self, actor: &Actor) -> bool;

    /// Move attachments between records, sub-scopes and categories.
    async fn can_edit_metadata(&self, actor: &Actor) -> bool;
}

/// Allow lists taken from configuration. `*` admits everyone; the system
/// actor is always admitted.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityChecker {
    uploaders: Vec<String>,
    editors: Vec<String>,
}

impl StaticCapabilityChecker {
    pub fn new(uploaders: Vec<String>, editors: Vec<String>) -> Self {
        Self { uploaders, editors }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.uploaders.clone(), config.editors.clone())
    }

    fn allowed(list: &[String], actor: &Actor) -> bool {
        actor.is_system
            || list
                .iter()
                .any(|entry| entry == WILDCARD || entry.eq_ignore_ascii_case(&actor.name))
    }
}

#[async_trait]
impl CapabilityChecker for StaticCapabilityChecker {
    async fn can_upload(&self, actor: &Actor) -> bool {
        Self::allowed(&self.uploaders, actor)
    }

    async fn can_edit_metadata(&self, actor: &Actor) -> bool {
        Self::allowed(&self.editors, actor)
    }
}

/// Outcome of checking a (record, sub-scope) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordValidation {
    pub exists: bool,
    /// True when no sub-scope was asked about.
    pub sub_scope_exists: bool,
    pub error_message: Option<String>,
}

impl RecordValidation {
    pub fn is_valid(&self) -> bool {
        self.exists && self.sub_scope_exists
    }

    /// Build a validation result from two lookups, filling in the message.
    pub fn from_lookups(
        record_id: i64,
        sub_scope_id: Option<i64>,
        exists: bool,
        sub_scope_exists: bool,
    ) -> Self {
        let error_message = if !exists {
            Some(format!("Record {} does not exist", record_id))
        } else if !sub_scope_exists {
            sub_scope_id.map(|sub| format!("Line {} does not belong to record {}", sub, record_id))
        } else {
            None
        };
        Self {
            exists,
            sub_scope_exists,
            error_message,
        }
    }
}

/// Confirms that a relocation target exists.
#[async_trait]
pub trait RecordValidator: Send + Sync {
    async fn validate(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
    ) -> Result<RecordValidation, AppError>;
}

/// Record validation against the `rma_records` / `rma_lines` tables.
#[derive(Clone)]
pub struct PgRecordValidator {
    records: RecordRepository,
}

impl PgRecordValidator {
    pub fn new(records: RecordRepository) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordValidator for PgRecordValidator {
    async fn validate(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
    ) -> Result<RecordValidation, AppError> {
        let exists = self.records.record_exists(record_id).await?;
        let sub_scope_exists = match (exists, sub_scope_id) {
            (true, Some(sub)) => self.records.line_exists(record_id, sub).await?,
            (false, Some(_)) => false,
            (_, None) => true,
        };
        Ok(RecordValidation::from_lookups(
            record_id,
            sub_scope_id,
            exists,
            sub_scope_exists,
        ))
    }
}

/// Fixed set of records and their lines, for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordValidator {
    records: HashMap<i64, HashSet<i64>>,
}

impl StaticRecordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record_id: i64, lines: impl IntoIterator<Item = i64>) -> Self {
        self.records
            .entry(record_id)
            .or_default()
            .extend(lines);
        self
    }
}

#[async_trait]
impl RecordValidator for StaticRecordValidator {
    async fn validate(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
    ) -> Result<RecordValidation, AppError> {
        let lines = self.records.get(&record_id);
        let sub_scope_exists = match sub_scope_id {
            Some(sub) => lines.is_some_and(|l| l.contains(&sub)),
            None => true,
        };
        Ok(RecordValidation::from_lookups(
            record_id,
            sub_scope_id,
            lines.is_some(),
            sub_scope_exists,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_capabilities() {
        let checker = StaticCapabilityChecker::new(vec!["Alice".to_string()], vec!["*".to_string()]);

        assert!(checker.can_upload(&Actor::user("alice")).await);
        assert!(!checker.can_upload(&Actor::user("bob")).await);
        assert!(checker.can_upload(&Actor::system()).await);
        assert!(checker.can_edit_metadata(&Actor::user("bob")).await);
    }

    #[tokio::test]
    async fn test_empty_allow_list_denies() {
        let checker = StaticCapabilityChecker::default();
        assert!(!checker.can_upload(&Actor::user("alice")).await);
        assert!(!checker.can_edit_metadata(&Actor::user("alice")).await);
    }

    #[tokio::test]
    async fn test_static_record_validator() {
        let validator = StaticRecordValidator::new().with_record(10, [1, 2]);

        assert!(validator.validate(10, None).await.unwrap().is_valid());
        assert!(validator.validate(10, Some(2)).await.unwrap().is_valid());

        let bad_line = validator.validate(10, Some(3)).await.unwrap();
        assert!(bad_line.exists);
        assert!(!bad_line.sub_scope_exists);
        assert_eq!(
            bad_line.error_message.as_deref(),
            Some("Line 3 does not belong to record 10")
        );

        let missing = validator.validate(11, None).await.unwrap();
        assert!(!missing.is_valid());
        assert_eq!(missing.error_message.as_deref(), Some("Record 11 does not exist"));
    }
}

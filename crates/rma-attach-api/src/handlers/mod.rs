pub mod archive;
pub mod attachments;
pub mod download;
pub mod health;
pub mod relocation;
pub mod upload;

use rma_attach_core::validation::parse_record_id;
use rma_attach_core::AppError;

/// Record id from a path segment, as a validation error rather than a bare
/// 400 from the extractor.
pub(crate) fn record_id_from_path(raw: &str) -> Result<i64, AppError> {
    parse_record_id(raw).map_err(|e| AppError::InvalidInput(e.to_string()))
}

//! RMA attachment services
//!
//! Business logic of the attachment engine: batch uploads with conflict
//! handling, relocation, deletion, reconciliation, ZIP archives and
//! short-lived download tokens. Every service keeps disk and tracking table
//! consistent by ordering its steps and compensating when the second step
//! fails.

pub mod archive;
pub mod attachments;
pub mod audit;
pub mod cleanup;
pub mod collaborators;
pub mod context;
pub mod relocation;
pub mod temp_token;
pub mod upload;

#[cfg(test)]
mod test_helpers;

pub use archive::{ArchiveResult, ArchiveService};
pub use attachments::{AttachmentService, AttachmentView, MissingFile, ReconcileReport};
pub use audit::AuditService;
pub use cleanup::TokenSweepService;
pub use collaborators::{
    CapabilityChecker, CategoryProvider, PgRecordValidator, RecordValidation, RecordValidator,
    StaticCapabilityChecker, StaticRecordValidator,
};
pub use context::EngineContext;
pub use relocation::{
    BulkRelocationError, BulkRelocationResult, RelocationResult, RelocationService,
    RelocationTarget,
};
pub use temp_token::{TempTokenService, TokenDownload};
pub use upload::{
    ConflictStrategy, FileOutcome, StoredFile, UploadFile, UploadOutcome, UploadRequest,
    UploadService,
};

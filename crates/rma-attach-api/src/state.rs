//! Application state shared by every handler.

use rma_attach_services::{
    ArchiveService, AttachmentService, AuditService, EngineContext, RecordValidator,
    RelocationService, TempTokenService, UploadService,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub relocations: RelocationService,
    pub attachments: AttachmentService,
    pub audit: AuditService,
    pub archives: ArchiveService,
    pub tokens: TempTokenService,
    /// Per-file limit, also used to bound how much of a part is spooled.
    pub max_file_size_bytes: u64,
    /// Where multipart file parts wait for the upload service.
    pub spool_dir: PathBuf,
}

impl AppState {
    /// Wire every service over one engine context.
    pub fn new(
        ctx: EngineContext,
        records: Arc<dyn RecordValidator>,
        tokens: TempTokenService,
        max_file_size_bytes: u64,
    ) -> Self {
        Self {
            uploads: UploadService::new(ctx.clone(), max_file_size_bytes),
            relocations: RelocationService::new(ctx.clone(), records),
            attachments: AttachmentService::new(ctx.clone()),
            audit: ctx.audit.clone(),
            archives: ArchiveService::new(
                ctx.attachments.clone(),
                ctx.storage.clone(),
                tokens.clone(),
            ),
            spool_dir: tokens.artifact_root().to_path_buf(),
            tokens,
            max_file_size_bytes,
        }
    }
}

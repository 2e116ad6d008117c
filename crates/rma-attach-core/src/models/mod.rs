pub mod attachment;
pub mod audit;
pub mod category;
pub mod temp_token;

pub use attachment::{
    Attachment, AttachmentFilter, AttachmentLocation, AttachmentWithCategory, NewAttachment,
};
pub use audit::{AuditAction, AuditLogEntry, NewAuditEntry};
pub use category::{Category, ScopeLevel};
pub use temp_token::{NewTempToken, TempToken};

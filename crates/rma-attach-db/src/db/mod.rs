//! Postgres repositories
//!
//! One repository per table. Each implements the matching trait from
//! `crate::traits`.

pub mod attachment;
pub mod audit;
pub mod category;
pub mod record;
pub mod temp_token;

pub use attachment::AttachmentRepository;
pub use audit::AuditLogRepository;
pub use category::CategoryRepository;
pub use record::RecordRepository;
pub use temp_token::TempTokenRepository;

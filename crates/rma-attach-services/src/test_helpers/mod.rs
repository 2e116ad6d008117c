//! Fixtures for service tests: real files in temp directories, in-memory
//! tracking tables, and switches for making the store or the disk fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rma_attach_core::models::{
    Attachment, AttachmentFilter, AttachmentLocation, AttachmentWithCategory, Category,
    NewAttachment, ScopeLevel,
};
use rma_attach_core::{AppError, DisplayAlias};
use rma_attach_db::memory::{
    InMemoryAttachments, InMemoryAuditLog, InMemoryCategories, InMemoryTempTokens,
};
use rma_attach_db::AttachmentStore;
use rma_attach_storage::{
    ByteStream, LocalStorage, PathResolver, Storage, StorageError, StorageResult, UploadReader,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use crate::archive::ArchiveService;
use crate::attachments::AttachmentService;
use crate::audit::AuditService;
use crate::collaborators::{StaticCapabilityChecker, StaticRecordValidator};
use crate::context::EngineContext;
use crate::relocation::RelocationService;
use crate::temp_token::TempTokenService;
use crate::upload::UploadService;

pub const MAX_FILE_SIZE: u64 = 1024;
pub const DISPLAY_ROOT: &str = "R:";

/// Switches consulted by the failing wrappers.
#[derive(Default)]
pub struct Faults {
    pub fail_insert: AtomicBool,
    pub fail_record_overwrite: AtomicBool,
    pub fail_relocate: AtomicBool,
    pub fail_soft_delete: AtomicBool,
    /// Writes to a file with this name fail.
    pub fail_write_named: Mutex<Option<String>>,
}

impl Faults {
    fn check(flag: &AtomicBool, what: &str) -> Result<(), AppError> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::Internal(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }

    pub fn fail_writes_to(&self, name: &str) {
        *self.fail_write_named.lock().unwrap() = Some(name.to_string());
    }
}

/// Attachment store that fails on demand.
pub struct FlakyAttachments {
    inner: InMemoryAttachments,
    faults: Arc<Faults>,
}

#[async_trait]
impl AttachmentStore for FlakyAttachments {
    async fn find_active_by_path(
        &self,
        storage_path: &str,
    ) -> Result<Option<Attachment>, AppError> {
        self.inner.find_active_by_path(storage_path).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Attachment>, AppError> {
        self.inner.get(id).await
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Attachment>, AppError> {
        self.inner.get_many(ids).await
    }

    async fn insert(&self, new: NewAttachment) -> Result<Attachment, AppError> {
        Faults::check(&self.faults.fail_insert, "insert")?;
        self.inner.insert(new).await
    }

    async fn record_overwrite(
        &self,
        id: Uuid,
        size_bytes: i64,
        uploaded_by: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Attachment, AppError> {
        Faults::check(&self.faults.fail_record_overwrite, "overwrite")?;
        self.inner
            .record_overwrite(id, size_bytes, uploaded_by, uploaded_at)
            .await
    }

    async fn relocate(
        &self,
        id: Uuid,
        location: &AttachmentLocation,
    ) -> Result<Attachment, AppError> {
        Faults::check(&self.faults.fail_relocate, "relocate")?;
        self.inner.relocate(id, location).await
    }

    async fn soft_delete_by_path(
        &self,
        storage_path: &str,
        deleted_by: &str,
    ) -> Result<Option<Attachment>, AppError> {
        Faults::check(&self.faults.fail_soft_delete, "delete")?;
        self.inner.soft_delete_by_path(storage_path, deleted_by).await
    }

    async fn list(
        &self,
        filter: &AttachmentFilter,
    ) -> Result<Vec<AttachmentWithCategory>, AppError> {
        self.inner.list(filter).await
    }
}

/// Local storage whose writes to one chosen file name fail.
pub struct FlakyStorage {
    inner: LocalStorage,
    faults: Arc<Faults>,
}

#[async_trait]
impl Storage for FlakyStorage {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    async fn ensure_dir(&self, dir: &Path) -> StorageResult<()> {
        self.inner.ensure_dir(dir).await
    }

    async fn exists(&self, path: &Path) -> StorageResult<bool> {
        self.inner.exists(path).await
    }

    async fn write_stream(
        &self,
        path: &Path,
        reader: UploadReader,
        max_bytes: Option<u64>,
    ) -> StorageResult<u64> {
        let target = self.faults.fail_write_named.lock().unwrap().clone();
        if let Some(target) = target {
            if path.file_name().is_some_and(|n| n.to_string_lossy() == target) {
                return Err(StorageError::WriteFailed("injected disk failure".to_string()));
            }
        }
        self.inner.write_stream(path, reader, max_bytes).await
    }

    async fn delete(&self, path: &Path) -> StorageResult<()> {
        self.inner.delete(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.inner.copy(from, to).await
    }

    async fn content_length(&self, path: &Path) -> StorageResult<u64> {
        self.inner.content_length(path).await
    }

    async fn list_files(&self, dir: &Path) -> StorageResult<Vec<String>> {
        self.inner.list_files(dir).await
    }

    async fn download_stream(&self, path: &Path) -> StorageResult<ByteStream> {
        self.inner.download_stream(path).await
    }
}

fn category(key: &str, extensions: &[&str], scope: ScopeLevel) -> Category {
    Category {
        id: Uuid::new_v4(),
        key: key.to_string(),
        label: key.to_string(),
        allowed_extensions: extensions.iter().map(|e| e.to_string()).collect(),
        scope,
        is_active: true,
    }
}

/// A complete engine over temp directories and in-memory tables.
///
/// Categories: `docs` (header, any type), `photos` (header, jpg/png),
/// `logs` (line, any type), `retired` (header, inactive).
/// Records: 1 with lines 10 and 11, 2 with line 20, 3 without lines.
/// `alice` may upload and move, `bob` may only upload, `mallory` neither.
pub struct TestEngine {
    _storage_dir: TempDir,
    _artifact_dir: TempDir,
    pub ctx: EngineContext,
    pub faults: Arc<Faults>,
    pub attachment_store: InMemoryAttachments,
    pub audit_log: InMemoryAuditLog,
    pub token_store: InMemoryTempTokens,
    pub categories: InMemoryCategories,
    pub tokens: TempTokenService,
    pub archives: ArchiveService,
    pub uploads: UploadService,
    pub relocations: RelocationService,
    pub attachments: AttachmentService,
}

impl TestEngine {
    pub async fn new() -> Self {
        let storage_dir = TempDir::new().unwrap();
        let artifact_dir = TempDir::new().unwrap();
        let faults = Arc::new(Faults::default());

        let categories = InMemoryCategories::new(vec![
            category("docs", &["*"], ScopeLevel::Header),
            category("photos", &["jpg", "png"], ScopeLevel::Header),
            category("logs", &["*"], ScopeLevel::Line),
            Category {
                is_active: false,
                ..category("retired", &["*"], ScopeLevel::Header)
            },
        ]);
        let attachment_store = InMemoryAttachments::new(categories.clone());
        let audit_log = InMemoryAuditLog::new();
        let token_store = InMemoryTempTokens::new();

        let storage: Arc<dyn Storage> = Arc::new(FlakyStorage {
            inner: LocalStorage::new(storage_dir.path()).await.unwrap(),
            faults: faults.clone(),
        });
        let artifacts: Arc<dyn Storage> =
            Arc::new(LocalStorage::new(artifact_dir.path()).await.unwrap());
        let attachments: Arc<dyn AttachmentStore> = Arc::new(FlakyAttachments {
            inner: attachment_store.clone(),
            faults: faults.clone(),
        });

        let resolver = PathResolver::new(
            storage_dir.path(),
            vec![DisplayAlias {
                prefix: storage_dir.path().to_string_lossy().into_owned(),
                alias: DISPLAY_ROOT.to_string(),
            }],
        );

        let ctx = EngineContext {
            attachments: attachments.clone(),
            categories: Arc::new(categories.clone()),
            audit: AuditService::new(Arc::new(audit_log.clone())),
            storage: storage.clone(),
            resolver: Arc::new(resolver),
            capabilities: Arc::new(StaticCapabilityChecker::new(
                vec!["alice".to_string(), "bob".to_string()],
                vec!["alice".to_string()],
            )),
        };

        let records = StaticRecordValidator::new()
            .with_record(1, [10, 11])
            .with_record(2, [20])
            .with_record(3, std::iter::empty());

        let tokens = TempTokenService::new(
            Arc::new(token_store.clone()),
            artifacts,
            Duration::from_secs(3600),
        );

        Self {
            archives: ArchiveService::new(attachments, storage, tokens.clone()),
            uploads: UploadService::new(ctx.clone(), MAX_FILE_SIZE),
            relocations: RelocationService::new(ctx.clone(), Arc::new(records)),
            attachments: AttachmentService::new(ctx.clone()),
            tokens,
            ctx,
            faults,
            attachment_store,
            audit_log,
            token_store,
            categories,
            _storage_dir: storage_dir,
            _artifact_dir: artifact_dir,
        }
    }

    pub fn storage_root(&self) -> &Path {
        self._storage_dir.path()
    }

    pub fn artifact_root(&self) -> &Path {
        self._artifact_dir.path()
    }

    /// Directory of a record/sub-scope/category.
    pub fn dir(&self, record_id: i64, sub_scope_id: Option<i64>, category_key: &str) -> PathBuf {
        self.ctx
            .resolver
            .directory(record_id, sub_scope_id, category_key)
    }

    /// Put a file on disk without tracking it.
    pub async fn write_untracked(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
        category_key: &str,
        name: &str,
        bytes: &[u8],
    ) -> PathBuf {
        let dir = self.dir(record_id, sub_scope_id, category_key);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    /// A file in the artifacts directory, ready to be handed out by token.
    pub async fn write_artifact(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.artifact_root().join(name);
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    /// A tracked record-level file written directly, bypassing the upload path.
    pub async fn seed_file(
        &self,
        record_id: i64,
        category_key: &str,
        name: &str,
        bytes: &[u8],
    ) -> Attachment {
        self.seed_scoped_file(record_id, None, category_key, name, bytes)
            .await
    }

    pub async fn seed_scoped_file(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
        category_key: &str,
        name: &str,
        bytes: &[u8],
    ) -> Attachment {
        let category = self.category(category_key).await;
        let path = self
            .write_untracked(record_id, sub_scope_id, category_key, name, bytes)
            .await;
        self.attachment_store
            .insert(NewAttachment {
                record_id,
                sub_scope_id,
                file_name: name.to_string(),
                storage_path: path.to_string_lossy().into_owned(),
                size_bytes: bytes.len() as i64,
                category_id: category.id,
                uploaded_by: "seed".to_string(),
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    pub async fn category(&self, key: &str) -> Category {
        use rma_attach_db::CategoryProvider;
        self.categories.find_by_key(key).await.unwrap().unwrap()
    }

    pub async fn active_rows(&self) -> Vec<Attachment> {
        self.attachment_store
            .all()
            .await
            .into_iter()
            .filter(|a| a.is_active())
            .collect()
    }

    /// Every file name in a directory, temporary siblings included.
    pub fn files_in(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

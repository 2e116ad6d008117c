//! Test helpers: an AppState over in-memory tables and temp directories.
//!
//! No database is needed; run with `cargo test -p rma-attach-api`.

use axum_test::TestServer;
use rma_attach_api::constants::API_PREFIX;
use rma_attach_api::setup::routes;
use rma_attach_api::AppState;
use rma_attach_core::models::{Category, ScopeLevel};
use rma_attach_core::DisplayAlias;
use rma_attach_db::memory::{
    InMemoryAttachments, InMemoryAuditLog, InMemoryCategories, InMemoryTempTokens,
};
use rma_attach_services::{
    AuditService, EngineContext, StaticCapabilityChecker, StaticRecordValidator,
    TempTokenService,
};
use rma_attach_storage::{LocalStorage, PathResolver, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// API path under the versioned prefix.
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub struct TestApp {
    pub server: TestServer,
    pub storage_dir: TempDir,
    pub artifact_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
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

/// `alice` may upload and move, `bob` may only upload.
/// Records 1 (lines 10, 11) and 2 exist.
pub async fn setup_test_app() -> TestApp {
    let storage_dir = tempfile::tempdir().expect("Failed to create storage directory");
    let artifact_dir = tempfile::tempdir().expect("Failed to create temp directory");

    let categories = InMemoryCategories::new(vec![
        category("docs", &["*"], ScopeLevel::Header),
        category("photos", &["jpg", "png"], ScopeLevel::Header),
        category("logs", &["*"], ScopeLevel::Line),
    ]);

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(storage_dir.path())
            .await
            .expect("Failed to create local storage"),
    );
    let artifacts: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(artifact_dir.path())
            .await
            .expect("Failed to create artifact storage"),
    );

    let ctx = EngineContext {
        attachments: Arc::new(InMemoryAttachments::new(categories.clone())),
        categories: Arc::new(categories),
        audit: AuditService::new(Arc::new(InMemoryAuditLog::new())),
        storage,
        resolver: Arc::new(PathResolver::new(
            storage_dir.path(),
            vec![DisplayAlias {
                prefix: storage_dir.path().to_string_lossy().into_owned(),
                alias: "R:".to_string(),
            }],
        )),
        capabilities: Arc::new(StaticCapabilityChecker::new(
            vec!["alice".to_string(), "bob".to_string()],
            vec!["alice".to_string()],
        )),
    };

    let tokens = TempTokenService::new(
        Arc::new(InMemoryTempTokens::new()),
        artifacts,
        Duration::from_secs(600),
    );
    let records = StaticRecordValidator::new()
        .with_record(1, [10, 11])
        .with_record(2, std::iter::empty());

    let state = Arc::new(AppState::new(ctx, Arc::new(records), tokens, MAX_FILE_SIZE));
    let server = TestServer::new(routes::setup_routes(state)).expect("Failed to start test server");

    TestApp {
        server,
        storage_dir,
        artifact_dir,
    }
}

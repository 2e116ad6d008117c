//! Service wiring over the Postgres repositories and the attachment mount.

use anyhow::{Context, Result};
use rma_attach_core::Config;
use rma_attach_db::{
    AttachmentRepository, AuditLogRepository, CategoryRepository, RecordRepository,
    TempTokenRepository,
};
use rma_attach_services::{
    AuditService, EngineContext, PgRecordValidator, StaticCapabilityChecker, TempTokenService,
    TokenSweepService,
};
use rma_attach_storage::{LocalStorage, PathResolver, Storage};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

pub async fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.storage_root)
            .await
            .with_context(|| {
                format!(
                    "Attachment root {} is not usable",
                    config.storage_root.display()
                )
            })?,
    );
    let artifacts: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.temp_dir)
            .await
            .with_context(|| format!("Temp directory {} is not usable", config.temp_dir.display()))?,
    );
    tracing::info!(
        storage_root = %config.storage_root.display(),
        temp_dir = %config.temp_dir.display(),
        aliases = config.display_aliases.len(),
        "Storage initialized"
    );

    let ctx = EngineContext {
        attachments: Arc::new(AttachmentRepository::new(pool.clone())),
        categories: Arc::new(CategoryRepository::new(pool.clone())),
        audit: AuditService::new(Arc::new(AuditLogRepository::new(pool.clone()))),
        storage,
        resolver: Arc::new(PathResolver::new(
            config.storage_root.clone(),
            config.display_aliases.clone(),
        )),
        capabilities: Arc::new(StaticCapabilityChecker::from_config(config)),
    };

    let tokens = TempTokenService::new(
        Arc::new(TempTokenRepository::new(pool.clone())),
        artifacts,
        Duration::from_secs(config.token_ttl_secs),
    );

    if config.token_sweep_interval_secs > 0 {
        let sweep = Arc::new(TokenSweepService::new(
            tokens.clone(),
            Duration::from_secs(config.token_sweep_interval_secs),
        ));
        sweep.start();
        tracing::info!(
            interval_secs = config.token_sweep_interval_secs,
            "Temp token sweep started"
        );
    } else {
        tracing::warn!("Temp token sweep disabled, expired download files will accumulate");
    }

    let records = Arc::new(PgRecordValidator::new(RecordRepository::new(pool)));

    Ok(Arc::new(AppState::new(
        ctx,
        records,
        tokens,
        config.max_file_size_bytes,
    )))
}

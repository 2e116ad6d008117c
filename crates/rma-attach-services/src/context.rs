use rma_attach_core::models::Category;
use rma_attach_core::{Actor, AppError};
use rma_attach_db::{AttachmentStore, CategoryProvider};
use rma_attach_storage::{PathResolver, Storage};
use std::sync::Arc;

use crate::audit::AuditService;
use crate::collaborators::CapabilityChecker;

/// Collaborators shared by every attachment service.
#[derive(Clone)]
pub struct EngineContext {
    pub attachments: Arc<dyn AttachmentStore>,
    pub categories: Arc<dyn CategoryProvider>,
    pub audit: AuditService,
    pub storage: Arc<dyn Storage>,
    pub resolver: Arc<PathResolver>,
    pub capabilities: Arc<dyn CapabilityChecker>,
}

impl EngineContext {
    /// An active category by key, or a validation error.
    pub(crate) async fn active_category(&self, key: &str) -> Result<Category, AppError> {
        match self.categories.find_by_key(key).await? {
            Some(category) if category.is_active => Ok(category),
            Some(_) => Err(AppError::InvalidInput(format!(
                "Category '{}' is inactive",
                key
            ))),
            None => Err(AppError::InvalidInput(format!("Unknown category '{}'", key))),
        }
    }

    pub(crate) async fn require_upload(&self, actor: &Actor) -> Result<(), AppError> {
        if self.capabilities.can_upload(actor).await {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} is not allowed to upload or delete attachments",
                actor
            )))
        }
    }

    pub(crate) async fn require_edit_metadata(&self, actor: &Actor) -> Result<(), AppError> {
        if self.capabilities.can_edit_metadata(actor).await {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} is not allowed to move attachments",
                actor
            )))
        }
    }
}

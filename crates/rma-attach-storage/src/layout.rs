//! Attachment directory layout.
//!
//! Format: `{root}/RECORD_{record_id}[/SUB_{sub_scope_id}]/{category_key}/{file_name}`.
//! Every component that writes or locates attachment files must go through
//! [`PathResolver`] so the tree stays browsable by external tooling.

use rma_attach_core::constants::{RECORD_DIR_PREFIX, SUB_SCOPE_DIR_PREFIX};
use rma_attach_core::models::{Category, ScopeLevel};
use rma_attach_core::validation::{validate_category_key, validate_file_name};
use rma_attach_core::{AppError, DisplayAlias};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Invalid record id: {0}")]
    InvalidRecordId(i64),

    #[error("Invalid sub-scope id: {0}")]
    InvalidSubScopeId(i64),

    #[error("Category '{key}' is a {expected} category and cannot be used at {actual} level")]
    ScopeMismatch {
        key: String,
        expected: ScopeLevel,
        actual: ScopeLevel,
    },

    #[error("Invalid category key: {0}")]
    InvalidCategoryKey(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}

impl From<LayoutError> for AppError {
    fn from(err: LayoutError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Maps (record, sub-scope, category) to directories under a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    aliases: Vec<DisplayAlias>,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, mut aliases: Vec<DisplayAlias>) -> Self {
        // Longest prefix wins when aliases nest.
        aliases.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            root: root.into(),
            aliases,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for the given coordinates, without any validation.
    pub fn directory(&self, record_id: i64, sub_scope_id: Option<i64>, category_key: &str) -> PathBuf {
        let mut dir = self.root.join(format!("{}{}", RECORD_DIR_PREFIX, record_id));
        if let Some(sub) = sub_scope_id {
            dir.push(format!("{}{}", SUB_SCOPE_DIR_PREFIX, sub));
        }
        dir.push(category_key);
        dir
    }

    /// Canonical directory for a category at the given record/sub-scope.
    ///
    /// Header categories are only valid without a sub-scope, line categories
    /// only with one.
    pub fn resolve(
        &self,
        record_id: i64,
        sub_scope_id: Option<i64>,
        category: &Category,
    ) -> Result<PathBuf, LayoutError> {
        if record_id <= 0 {
            return Err(LayoutError::InvalidRecordId(record_id));
        }
        if let Some(sub) = sub_scope_id {
            if sub <= 0 {
                return Err(LayoutError::InvalidSubScopeId(sub));
            }
        }
        if !category.valid_for(sub_scope_id) {
            return Err(LayoutError::ScopeMismatch {
                key: category.key.clone(),
                expected: category.scope,
                actual: ScopeLevel::for_sub_scope(sub_scope_id),
            });
        }
        validate_category_key(&category.key)
            .map_err(|e| LayoutError::InvalidCategoryKey(e.to_string()))?;

        Ok(self.directory(record_id, sub_scope_id, &category.key))
    }

    /// Join a validated file name onto a resolved directory.
    pub fn file_path(&self, dir: &Path, file_name: &str) -> Result<PathBuf, LayoutError> {
        validate_file_name(file_name).map_err(|e| LayoutError::InvalidFileName(e.to_string()))?;
        Ok(dir.join(file_name))
    }

    /// Human-facing form of a storage path.
    ///
    /// A configured network-root prefix is swapped for its alias
    /// (`\\fileserver\rma\RECORD_7\...` -> `R:\RECORD_7\...`). Matching is
    /// case-insensitive and only at a segment boundary; everything after the
    /// prefix is kept verbatim.
    pub fn display_path(&self, path: &str) -> String {
        for alias in &self.aliases {
            let prefix = alias.prefix.trim_end_matches(['/', '\\']);
            if prefix.is_empty() || path.len() < prefix.len() {
                continue;
            }
            let Some(head) = path.get(..prefix.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(prefix) {
                continue;
            }
            let rest = &path[prefix.len()..];
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
                return format!("{}{}", alias.alias.trim_end_matches(['/', '\\']), rest);
            }
        }
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn category(key: &str, scope: ScopeLevel) -> Category {
        Category {
            id: Uuid::new_v4(),
            key: key.to_string(),
            label: key.to_string(),
            allowed_extensions: vec!["*".to_string()],
            scope,
            is_active: true,
        }
    }

    fn resolver() -> PathResolver {
        PathResolver::new(
            "/mnt/rma",
            vec![DisplayAlias {
                prefix: "/mnt/rma".to_string(),
                alias: "R:".to_string(),
            }],
        )
    }

    fn segments(path: &str) -> usize {
        path.split(['/', '\\']).filter(|s| !s.is_empty()).count()
    }

    #[test]
    fn test_resolve_header_category() {
        let dir = resolver()
            .resolve(42, None, &category("photos", ScopeLevel::Header))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/mnt/rma/RECORD_42/photos"));
    }

    #[test]
    fn test_resolve_line_category() {
        let dir = resolver()
            .resolve(42, Some(7), &category("test_logs", ScopeLevel::Line))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/mnt/rma/RECORD_42/SUB_7/test_logs"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let r = resolver();
        let cat = category("photos", ScopeLevel::Header);
        assert_eq!(r.resolve(5, None, &cat), r.resolve(5, None, &cat));
    }

    #[test]
    fn test_resolve_rejects_scope_mismatch() {
        let r = resolver();
        assert!(matches!(
            r.resolve(1, Some(2), &category("photos", ScopeLevel::Header)),
            Err(LayoutError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            r.resolve(1, None, &category("test_logs", ScopeLevel::Line)),
            Err(LayoutError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_bad_ids_and_keys() {
        let r = resolver();
        let cat = category("photos", ScopeLevel::Header);
        assert_eq!(r.resolve(0, None, &cat), Err(LayoutError::InvalidRecordId(0)));
        assert!(r
            .resolve(1, None, &category("../etc", ScopeLevel::Header))
            .is_err());
        assert_eq!(
            r.resolve(1, Some(-3), &category("logs", ScopeLevel::Line)),
            Err(LayoutError::InvalidSubScopeId(-3))
        );
    }

    #[test]
    fn test_file_path_validates_name() {
        let r = resolver();
        let dir = PathBuf::from("/mnt/rma/RECORD_1/photos");
        assert_eq!(
            r.file_path(&dir, "a.jpg").unwrap(),
            PathBuf::from("/mnt/rma/RECORD_1/photos/a.jpg")
        );
        assert!(r.file_path(&dir, "../a.jpg").is_err());
        assert!(r.file_path(&dir, "").is_err());
    }

    #[test]
    fn test_display_path_preserves_segments() {
        let r = resolver();
        let dir = r
            .resolve(42, Some(7), &category("logs", ScopeLevel::Line))
            .unwrap();
        let path = r.file_path(&dir, "run.pdf").unwrap();
        let raw = path.to_string_lossy().into_owned();
        let shown = r.display_path(&raw);

        assert_eq!(shown, "R:/RECORD_42/SUB_7/logs/run.pdf");
        // Below the root the segment count is unchanged.
        assert_eq!(segments(&shown) - 1, segments(&raw) - segments("/mnt/rma"));
    }

    #[test]
    fn test_display_path_unc_prefix_case_insensitive() {
        let r = PathResolver::new(
            r"\\fileserver\rma",
            vec![DisplayAlias {
                prefix: r"\\FileServer\RMA\".to_string(),
                alias: "R:".to_string(),
            }],
        );
        assert_eq!(
            r.display_path(r"\\fileserver\rma\RECORD_1\photos\a.jpg"),
            r"R:\RECORD_1\photos\a.jpg"
        );
    }

    #[test]
    fn test_display_path_requires_segment_boundary() {
        let r = resolver();
        assert_eq!(r.display_path("/mnt/rma2/RECORD_1"), "/mnt/rma2/RECORD_1");
        assert_eq!(r.display_path("/other/RECORD_1"), "/other/RECORD_1");
        assert_eq!(r.display_path("/mnt/rma"), "R:");
    }
}

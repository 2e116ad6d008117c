use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::ANY_EXTENSION;
use crate::validation::file_extension;

/// Directory level a category may be filed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "category_scope", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    /// Attached to the record as a whole (no sub-scope segment).
    Header,
    /// Attached to one sub-scope (line item) of the record.
    Line,
}

impl ScopeLevel {
    /// The level implied by the presence or absence of a sub-scope id.
    pub fn for_sub_scope(sub_scope_id: Option<i64>) -> Self {
        match sub_scope_id {
            Some(_) => ScopeLevel::Line,
            None => ScopeLevel::Header,
        }
    }
}

impl FromStr for ScopeLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "header" => Ok(ScopeLevel::Header),
            "line" => Ok(ScopeLevel::Line),
            _ => Err(anyhow::anyhow!("Invalid category scope: {}", s)),
        }
    }
}

impl Display for ScopeLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScopeLevel::Header => write!(f, "header"),
            ScopeLevel::Line => write!(f, "line"),
        }
    }
}

/// A named classification of attachment purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: Uuid,
    /// Stable identifier, also the last directory segment.
    pub key: String,
    pub label: String,
    /// Lower-case extensions without the dot, or `*` for any.
    pub allowed_extensions: Vec<String>,
    pub scope: ScopeLevel,
    pub is_active: bool,
}

impl Category {
    pub fn accepts_any_extension(&self) -> bool {
        self.allowed_extensions
            .iter()
            .any(|ext| ext.trim() == ANY_EXTENSION)
    }

    /// Whether a file with this name may be filed under the category.
    pub fn accepts_file(&self, file_name: &str) -> bool {
        if self.accepts_any_extension() {
            return true;
        }
        let Some(ext) = file_extension(file_name) else {
            return false;
        };
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim().trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    /// Whether the category can be used at the level implied by `sub_scope_id`.
    pub fn valid_for(&self, sub_scope_id: Option<i64>) -> bool {
        self.scope == ScopeLevel::for_sub_scope(sub_scope_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(extensions: &[&str], scope: ScopeLevel) -> Category {
        Category {
            id: Uuid::new_v4(),
            key: "photos".to_string(),
            label: "Photos".to_string(),
            allowed_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            scope,
            is_active: true,
        }
    }

    #[test]
    fn test_accepts_file_by_extension() {
        let cat = category(&["jpg", ".PNG"], ScopeLevel::Header);
        assert!(cat.accepts_file("front.jpg"));
        assert!(cat.accepts_file("FRONT.JPG"));
        assert!(cat.accepts_file("side.png"));
        assert!(!cat.accepts_file("notes.txt"));
        assert!(!cat.accepts_file("no_extension"));
    }

    #[test]
    fn test_wildcard_accepts_everything() {
        let cat = category(&["*"], ScopeLevel::Header);
        assert!(cat.accepts_file("anything.bin"));
        assert!(cat.accepts_file("README"));
    }

    #[test]
    fn test_valid_for_scope() {
        let header = category(&["*"], ScopeLevel::Header);
        let line = category(&["*"], ScopeLevel::Line);
        assert!(header.valid_for(None));
        assert!(!header.valid_for(Some(7)));
        assert!(line.valid_for(Some(7)));
        assert!(!line.valid_for(None));
    }

    #[test]
    fn test_scope_level_from_str() {
        assert_eq!("HEADER".parse::<ScopeLevel>().unwrap(), ScopeLevel::Header);
        assert_eq!("line".parse::<ScopeLevel>().unwrap(), ScopeLevel::Line);
        assert!("detail".parse::<ScopeLevel>().is_err());
    }
}

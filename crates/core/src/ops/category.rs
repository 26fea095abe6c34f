//! Category operations, with per-store mode enforcement.
//!
//! A store's category mode decides which paths may be created: `free`
//! allows anything, `subcategories` requires a configured root segment,
//! `strict` requires the exact path to appear in the configured hierarchy.
//! Explicitly-configured categories are protected from deletion under the
//! non-free modes.

use crate::category::MAX_DESCRIPTION_LEN;
use crate::config::{hierarchy_contains, hierarchy_has_root, CategoryHierarchy, CategoryMode};
use crate::ops::CategoryOpError;
use crate::path::CategoryPath;
use crate::storage::StorageAdapter;
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// Mode context
// ---------------------------------------------------------------------------

/// Category-mode policy for one store, assembled from its definition.
#[derive(Debug, Clone)]
pub struct ModeContext {
    pub mode: CategoryMode,
    pub hierarchy: CategoryHierarchy,
}

impl ModeContext {
    /// The permissive default: any path may be created, nothing is protected.
    pub fn free() -> Self {
        ModeContext { mode: CategoryMode::Free, hierarchy: CategoryHierarchy::new() }
    }

    fn check_create(&self, path: &CategoryPath) -> Result<(), CategoryOpError> {
        match self.mode {
            CategoryMode::Free => Ok(()),
            CategoryMode::Subcategories => {
                let root = path.root_segment().expect("non-root path has a first segment");
                if hierarchy_has_root(&self.hierarchy, root) {
                    Ok(())
                } else {
                    Err(CategoryOpError::ModeViolation {
                        path: path.to_string(),
                        message: format!(
                            "'{root}' is not a configured root category (mode: subcategories)"
                        ),
                    })
                }
            }
            CategoryMode::Strict => {
                if hierarchy_contains(&self.hierarchy, path.segments()) {
                    Ok(())
                } else {
                    Err(CategoryOpError::ModeViolation {
                        path: path.to_string(),
                        message: "path is not in the configured hierarchy (mode: strict)"
                            .to_string(),
                    })
                }
            }
        }
    }

    /// Explicitly-configured categories are protected under non-free modes.
    fn is_protected(&self, path: &CategoryPath) -> bool {
        self.mode != CategoryMode::Free && hierarchy_contains(&self.hierarchy, path.segments())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCreated {
    pub path: CategoryPath,
    /// `false` when the category already existed.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn create_category(
    adapter: &dyn StorageAdapter,
    path: &str,
    mode: &ModeContext,
) -> Result<CategoryCreated, CategoryOpError> {
    let path = CategoryPath::parse(path)?;
    if path.is_root() {
        return Err(CategoryOpError::RootNotAllowed);
    }
    mode.check_create(&path)?;

    let exists = adapter
        .category_exists(&path)
        .map_err(|e| CategoryOpError::storage(format!("checking category '{path}'"), e))?;
    if exists {
        return Ok(CategoryCreated { path, created: false });
    }

    adapter
        .ensure_category(&path)
        .map_err(|e| CategoryOpError::storage(format!("creating category '{path}'"), e))?;
    info!(category = %path, "Created category");
    Ok(CategoryCreated { path, created: true })
}

/// Delete a category and everything beneath it: subcategories, memories,
/// and index entries.
pub fn delete_category(
    adapter: &dyn StorageAdapter,
    path: &str,
    mode: &ModeContext,
) -> Result<CategoryPath, CategoryOpError> {
    let path = CategoryPath::parse(path)?;
    if path.is_root() {
        return Err(CategoryOpError::RootNotAllowed);
    }
    if mode.is_protected(&path) {
        return Err(CategoryOpError::Protected(path.to_string()));
    }

    adapter
        .delete_category(&path)
        .map_err(|e| CategoryOpError::storage(format!("deleting category '{path}'"), e))?;
    info!(category = %path, "Deleted category");
    Ok(path)
}

/// Set or clear a category's description (≤ 500 characters, non-root only).
pub fn set_category_description(
    adapter: &dyn StorageAdapter,
    path: &str,
    description: Option<&str>,
) -> Result<CategoryPath, CategoryOpError> {
    let path = CategoryPath::parse(path)?;
    if path.is_root() {
        return Err(CategoryOpError::RootNotAllowed);
    }
    if let Some(desc) = description {
        if desc.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CategoryOpError::InvalidInput(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} characters"
            )));
        }
    }

    adapter
        .set_category_description(&path, description)
        .map_err(|e| CategoryOpError::storage(format!("describing category '{path}'"), e))?;
    Ok(path)
}

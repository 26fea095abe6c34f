//! Category index projections.
//!
//! A category's index is a derived cache of the memory-file ground truth:
//! one entry per direct memory, one entry per direct subcategory. Indexes
//! are queried for listing and discovery only; `reindex` reconstructs them
//! from the files whenever they diverge.

use crate::path::{CategoryPath, MemoryPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category descriptions are capped at this length everywhere.
pub const MAX_DESCRIPTION_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Index entries
// ---------------------------------------------------------------------------

/// Index projection of a memory: enough to list and rank without reading
/// the memory file itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMemoryEntry {
    pub path: MemoryPath,
    pub token_estimate: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Index projection of a direct subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcategoryEntry {
    pub path: CategoryPath,
    /// Count of memories directly under the subcategory (not recursive).
    pub memory_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// On-disk category index: direct memories and direct subcategories,
/// each sorted by path so writes are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub memories: Vec<CategoryMemoryEntry>,
    #[serde(default)]
    pub subcategories: Vec<SubcategoryEntry>,
}

impl Category {
    /// Build a category index with both sections sorted by path.
    pub fn new(
        mut memories: Vec<CategoryMemoryEntry>,
        mut subcategories: Vec<SubcategoryEntry>,
    ) -> Self {
        memories.sort_by(|a, b| a.path.cmp(&b.path));
        subcategories.sort_by(|a, b| a.path.cmp(&b.path));
        Category { memories, subcategories }
    }

    /// Re-establish sort order after in-place edits.
    pub fn normalize(&mut self) {
        self.memories.sort_by(|a, b| a.path.cmp(&b.path));
        self.subcategories.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn memory_entry(&self, path: &MemoryPath) -> Option<&CategoryMemoryEntry> {
        self.memories.iter().find(|e| &e.path == path)
    }

    pub fn subcategory_entry(&self, path: &CategoryPath) -> Option<&SubcategoryEntry> {
        self.subcategories.iter().find(|e| &e.path == path)
    }

    /// Insert or replace the entry for one memory, keeping order.
    pub fn upsert_memory(&mut self, entry: CategoryMemoryEntry) {
        self.memories.retain(|e| e.path != entry.path);
        self.memories.push(entry);
        self.normalize();
    }

    /// Insert or replace the entry for one subcategory, keeping order.
    pub fn upsert_subcategory(&mut self, entry: SubcategoryEntry) {
        self.subcategories.retain(|e| e.path != entry.path);
        self.subcategories.push(entry);
        self.normalize();
    }
}

// ---------------------------------------------------------------------------
// Reindex report
// ---------------------------------------------------------------------------

/// Outcome of a scoped reindex: what was rebuilt, plus warnings for
/// memory files that could not be parsed (skipped, not fatal).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    pub scope: CategoryPath,
    pub indexed_categories: usize,
    pub indexed_memories: usize,
    pub warnings: Vec<String>,
}

impl ReindexReport {
    pub fn new(scope: CategoryPath) -> Self {
        ReindexReport { scope, indexed_categories: 0, indexed_memories: 0, warnings: Vec::new() }
    }
}

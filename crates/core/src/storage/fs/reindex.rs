//! Scoped index rebuild from ground truth.
//!
//! Walks the directory tree beneath a scope, re-derives every category
//! index from the memory files actually on disk, and rewrites the index
//! files atomically. Unreadable memory files are skipped with a warning.
//! Authored metadata (memory summaries, subcategory descriptions) found in
//! the previous indexes is carried over; everything else is recomputed.

use crate::category::{Category, CategoryMemoryEntry, ReindexReport, SubcategoryEntry};
use crate::path::{CategoryPath, MemoryPath, Slug};
use crate::storage::fs::{frontmatter, FsAdapter, INDEX_FILE_NAME, MEMORY_FILE_EXT};
use crate::storage::AdapterError;
use crate::storage::CategoryStore;
use std::path::Path;
use tracing::{debug, warn};

pub(super) fn run(adapter: &FsAdapter, scope: &CategoryPath) -> Result<ReindexReport, AdapterError> {
    let scope_dir = adapter.category_dir(scope);
    if !scope_dir.is_dir() {
        if scope.is_root() {
            // Empty store: scaffold the root and report nothing indexed.
            adapter.ensure_category(scope)?;
            return Ok(ReindexReport::new(scope.clone()));
        }
        return Err(AdapterError::NotFound(format!("category '{scope}' does not exist")));
    }

    let mut report = ReindexReport::new(scope.clone());
    rebuild(adapter, scope, &scope_dir, &mut report)?;

    // The scope's own memory count lives in its parent's index; refresh it
    // so the seam stays consistent with what was just rebuilt.
    if !scope.is_root() {
        adapter.refresh_parent_entry(scope)?;
    }

    debug!(
        scope = %scope,
        categories = report.indexed_categories,
        memories = report.indexed_memories,
        warnings = report.warnings.len(),
        "Reindex complete"
    );
    Ok(report)
}

/// Depth-first rebuild. Returns the fresh index for `category` after
/// writing it, so the caller can derive subcategory memory counts.
fn rebuild(
    adapter: &FsAdapter,
    category: &CategoryPath,
    dir: &Path,
    report: &mut ReindexReport,
) -> Result<Category, AdapterError> {
    // Old index, if parseable, supplies authored summaries/descriptions.
    let previous = adapter.read_index(category).unwrap_or_default().unwrap_or_default();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| AdapterError::io_read(format!("reading {}", dir.display()), e))?;

    let mut memories: Vec<CategoryMemoryEntry> = Vec::new();
    let mut subcategories: Vec<SubcategoryEntry> = Vec::new();

    for entry in entries {
        let entry =
            entry.map_err(|e| AdapterError::io_read(format!("reading {}", dir.display()), e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            report.warnings.push(format!("skipping non-UTF-8 name in {}", dir.display()));
            continue;
        };
        if name.starts_with('.') || name == INDEX_FILE_NAME {
            continue;
        }
        let path = entry.path();

        if path.is_dir() {
            let slug = match Slug::parse(name) {
                Ok(s) => s,
                Err(_) => {
                    report
                        .warnings
                        .push(format!("skipping directory with invalid name: {}", path.display()));
                    continue;
                }
            };
            let child_path = category.child(slug);
            let child = rebuild(adapter, &child_path, &path, report)?;
            let description =
                previous.subcategory_entry(&child_path).and_then(|e| e.description.clone());
            subcategories.push(SubcategoryEntry {
                path: child_path,
                memory_count: child.memories.len(),
                description,
            });
        } else if path.extension().and_then(|e| e.to_str()) == Some(MEMORY_FILE_EXT) {
            if category.is_root() {
                report
                    .warnings
                    .push(format!("memory file at store root ignored: {}", path.display()));
                continue;
            }
            match index_memory_file(adapter, category, name, &path) {
                Ok(mut entry) => {
                    entry.summary =
                        previous.memory_entry(&entry.path).and_then(|e| e.summary.clone());
                    memories.push(entry);
                    report.indexed_memories += 1;
                }
                Err(message) => {
                    warn!(file = %path.display(), "Skipping unreadable memory file");
                    report.warnings.push(message);
                }
            }
        }
    }

    let index = Category::new(memories, subcategories);
    adapter.write_index(category, &index)?;
    report.indexed_categories += 1;
    Ok(index)
}

/// Parse one memory file into its index entry. Errors are reported as
/// warnings by the caller, never as failures.
fn index_memory_file(
    adapter: &FsAdapter,
    category: &CategoryPath,
    file_name: &str,
    path: &Path,
) -> Result<CategoryMemoryEntry, String> {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    let slug = Slug::parse(stem)
        .map_err(|e| format!("invalid memory file name {}: {e}", path.display()))?;
    let memory_path = MemoryPath::new(category.clone(), slug)
        .map_err(|e| format!("invalid memory path for {}: {e}", path.display()))?;

    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("unreadable memory file {}: {e}", path.display()))?;
    let doc = frontmatter::parse(&text)
        .map_err(|e| format!("malformed memory file {}: {e}", path.display()))?;

    Ok(CategoryMemoryEntry {
        path: memory_path,
        token_estimate: adapter.estimator().estimate(&doc.content),
        summary: None,
        updated_at: Some(doc.metadata.updated_at),
    })
}

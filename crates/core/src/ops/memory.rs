//! Memory lifecycle operations.
//!
//! Paths arrive as raw strings and are validated here; everything past the
//! parse works with value types. Listing, pruning, and recency walk the
//! category-index tree only — memory files are read to evaluate expiration,
//! never to enumerate.

use crate::category::ReindexReport;
use crate::memory::{Memory, MemoryMetadata};
use crate::ops::{MemoryOpError, Patch};
use crate::path::{CategoryPath, MemoryPath};
use crate::storage::StorageAdapter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Inputs and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateMemoryInput {
    pub content: String,
    /// Origin of the memory, e.g. "cli", "mcp", "user".
    pub source: String,
    pub tags: Vec<String>,
    pub citations: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMemoryInput {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Replaces the citation list entirely when present.
    pub citations: Option<Vec<String>>,
    pub expires_at: Patch<DateTime<Utc>>,
}

impl UpdateMemoryInput {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.tags.is_none()
            && self.citations.is_none()
            && self.expires_at.is_keep()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub include_expired: bool,
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub category: Option<String>,
    pub include_expired: bool,
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    pub dry_run: bool,
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RecentOptions {
    pub category: Option<String>,
    pub limit: usize,
    pub include_expired: bool,
    pub now: Option<DateTime<Utc>>,
}

impl Default for RecentOptions {
    fn default() -> Self {
        RecentOptions { category: None, limit: 5, include_expired: false, now: None }
    }
}

/// One memory row in a listing. Metadata comes from the index entry; the
/// expiration flag is evaluated against the memory file itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedMemory {
    pub path: MemoryPath,
    pub token_estimate: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedSubcategory {
    pub path: CategoryPath,
    pub memory_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub category: CategoryPath,
    pub memories: Vec<ListedMemory>,
    pub subcategories: Vec<ListedSubcategory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunedMemory {
    pub path: MemoryPath,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResult {
    pub scope: CategoryPath,
    pub dry_run: bool,
    pub pruned: Vec<PrunedMemory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentResult {
    /// `None` means "all root categories".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryPath>,
    pub memories: Vec<Memory>,
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

/// Create a memory. The parent category must already exist — creation never
/// auto-creates categories.
pub fn create(
    adapter: &dyn StorageAdapter,
    path: &str,
    input: CreateMemoryInput,
    now: Option<DateTime<Utc>>,
) -> Result<Memory, MemoryOpError> {
    let path = MemoryPath::parse(path)?;
    let now = now.unwrap_or_else(Utc::now);

    let category = path.category();
    let exists = adapter
        .category_exists(category)
        .map_err(|e| MemoryOpError::storage(format!("checking category '{category}'"), e))?;
    if !exists {
        return Err(MemoryOpError::CategoryNotFound(category.to_string()));
    }

    let metadata = MemoryMetadata {
        created_at: now,
        updated_at: now,
        tags: input.tags,
        source: input.source,
        expires_at: input.expires_at,
        citations: input.citations,
    };
    let memory = Memory::new(path.clone(), metadata, input.content)
        .map_err(|e| MemoryOpError::InvalidInput(e.to_string()))?;

    adapter
        .save_memory(&memory)
        .map_err(|e| MemoryOpError::storage(format!("writing memory '{path}'"), e))?;
    adapter.update_after_memory_write(&memory).map_err(|e| {
        MemoryOpError::storage(
            format!("memory '{path}' was written but its index update failed; run reindex"),
            e,
        )
    })?;

    info!(memory = %path, "Created memory");
    Ok(memory)
}

// ---------------------------------------------------------------------------
// get
// ---------------------------------------------------------------------------

pub fn get(
    adapter: &dyn StorageAdapter,
    path: &str,
    options: GetOptions,
) -> Result<Memory, MemoryOpError> {
    let path = MemoryPath::parse(path)?;
    let now = options.now.unwrap_or_else(Utc::now);

    let memory = adapter
        .load_memory(&path)
        .map_err(|e| MemoryOpError::storage(format!("reading memory '{path}'"), e))?
        .ok_or_else(|| MemoryOpError::MemoryNotFound(path.to_string()))?;

    if !options.include_expired && memory.is_expired(now) {
        return Err(MemoryOpError::MemoryExpired {
            path: path.to_string(),
            expired_at: memory.metadata.expires_at.unwrap(),
        });
    }
    Ok(memory)
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

/// Merge updates into an existing memory. At least one field must be
/// present; `expires_at` is three-valued (keep / clear / set).
pub fn update(
    adapter: &dyn StorageAdapter,
    path: &str,
    updates: UpdateMemoryInput,
    now: Option<DateTime<Utc>>,
) -> Result<Memory, MemoryOpError> {
    if updates.is_empty() {
        return Err(MemoryOpError::InvalidInput(
            "update requires at least one of: content, tags, citations, expires_at".to_string(),
        ));
    }
    let path = MemoryPath::parse(path)?;
    let now = now.unwrap_or_else(Utc::now);

    let existing = adapter
        .load_memory(&path)
        .map_err(|e| MemoryOpError::storage(format!("reading memory '{path}'"), e))?
        .ok_or_else(|| MemoryOpError::MemoryNotFound(path.to_string()))?;

    let metadata = MemoryMetadata {
        created_at: existing.metadata.created_at,
        updated_at: now,
        tags: updates.tags.unwrap_or(existing.metadata.tags),
        source: existing.metadata.source,
        expires_at: updates.expires_at.apply(existing.metadata.expires_at),
        citations: updates.citations.unwrap_or(existing.metadata.citations),
    };
    let content = updates.content.unwrap_or(existing.content);
    let memory = Memory::new(path.clone(), metadata, content)
        .map_err(|e| MemoryOpError::InvalidInput(e.to_string()))?;

    adapter
        .save_memory(&memory)
        .map_err(|e| MemoryOpError::storage(format!("writing memory '{path}'"), e))?;
    adapter.update_after_memory_write(&memory).map_err(|e| {
        MemoryOpError::storage(
            format!("memory '{path}' was updated but its index update failed; run reindex"),
            e,
        )
    })?;

    info!(memory = %path, "Updated memory");
    Ok(memory)
}

// ---------------------------------------------------------------------------
// move
// ---------------------------------------------------------------------------

/// Move a memory to a new path. Destination categories are created as
/// needed; indexes are rebuilt from the closest common ancestor.
pub fn relocate(
    adapter: &dyn StorageAdapter,
    from: &str,
    to: &str,
) -> Result<MemoryPath, MemoryOpError> {
    let from = MemoryPath::parse(from)?;
    let to = MemoryPath::parse(to)?;
    if from == to {
        return Ok(to);
    }

    let source = adapter
        .load_memory(&from)
        .map_err(|e| MemoryOpError::storage(format!("reading memory '{from}'"), e))?;
    if source.is_none() {
        return Err(MemoryOpError::MemoryNotFound(from.to_string()));
    }
    let dest = adapter
        .load_memory(&to)
        .map_err(|e| MemoryOpError::storage(format!("reading memory '{to}'"), e))?;
    if dest.is_some() {
        return Err(MemoryOpError::DestinationExists(to.to_string()));
    }

    adapter
        .ensure_category(to.category())
        .map_err(|e| MemoryOpError::storage(format!("creating category '{}'", to.category()), e))?;
    adapter
        .move_memory(&from, &to)
        .map_err(|e| MemoryOpError::storage(format!("moving '{from}' to '{to}'"), e))?;

    let scope = from.category().common_ancestor(to.category());
    adapter.reindex(&scope).map_err(|e| {
        MemoryOpError::storage(
            format!("memory moved to '{to}' but reindexing '{scope}' failed; run reindex"),
            e,
        )
    })?;

    info!(from = %from, to = %to, "Moved memory");
    Ok(to)
}

// ---------------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------------

pub fn remove(adapter: &dyn StorageAdapter, path: &str) -> Result<MemoryPath, MemoryOpError> {
    let path = MemoryPath::parse(path)?;

    let existing = adapter
        .load_memory(&path)
        .map_err(|e| MemoryOpError::storage(format!("reading memory '{path}'"), e))?;
    if existing.is_none() {
        return Err(MemoryOpError::MemoryNotFound(path.to_string()));
    }

    adapter
        .remove_memory(&path)
        .map_err(|e| MemoryOpError::storage(format!("removing memory '{path}'"), e))?;
    adapter.reindex(path.category()).map_err(|e| {
        MemoryOpError::storage(
            format!("memory '{path}' was removed but reindexing failed; run reindex"),
            e,
        )
    })?;

    info!(memory = %path, "Removed memory");
    Ok(path)
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// List memories and subcategories beneath a category (or the whole store).
/// Walks index trees only; memory files are read solely to evaluate
/// expiration.
pub fn list(adapter: &dyn StorageAdapter, options: ListOptions) -> Result<ListResult, MemoryOpError> {
    let now = options.now.unwrap_or_else(Utc::now);
    let scope = match &options.category {
        Some(s) => CategoryPath::parse(s)?,
        None => CategoryPath::root(),
    };

    let mut entries = Vec::new();
    let subcategories: Vec<ListedSubcategory> = if scope.is_root() {
        // Dynamic root discovery: whatever the root index advertises.
        let root_index = load_index_or_default(adapter, &scope)?;
        for sub in &root_index.subcategories {
            collect_entries(adapter, &sub.path, &mut entries)?;
        }
        root_index.subcategories.iter().map(listed_subcategory).collect()
    } else {
        let index = adapter
            .load_index(&scope)
            .map_err(|e| MemoryOpError::storage(format!("reading index for '{scope}'"), e))?
            .ok_or_else(|| MemoryOpError::CategoryNotFound(scope.to_string()))?;
        entries.extend(index.memories.iter().cloned());
        for sub in &index.subcategories {
            collect_entries(adapter, &sub.path, &mut entries)?;
        }
        index.subcategories.iter().map(listed_subcategory).collect()
    };

    let mut memories = Vec::new();
    for entry in entries {
        let Some(memory) = adapter
            .load_memory(&entry.path)
            .map_err(|e| MemoryOpError::storage(format!("reading memory '{}'", entry.path), e))?
        else {
            // Stale index entry: the file is gone. Reindex will drop it.
            debug!(memory = %entry.path, "Index entry without memory file");
            continue;
        };
        let is_expired = memory.is_expired(now);
        if is_expired && !options.include_expired {
            continue;
        }
        memories.push(ListedMemory {
            path: entry.path,
            token_estimate: entry.token_estimate,
            summary: entry.summary,
            updated_at: entry.updated_at,
            is_expired,
        });
    }
    memories.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ListResult { category: scope, memories, subcategories })
}

fn listed_subcategory(entry: &crate::category::SubcategoryEntry) -> ListedSubcategory {
    ListedSubcategory {
        path: entry.path.clone(),
        memory_count: entry.memory_count,
        description: entry.description.clone(),
    }
}

fn load_index_or_default(
    adapter: &dyn StorageAdapter,
    category: &CategoryPath,
) -> Result<crate::category::Category, MemoryOpError> {
    adapter
        .load_index(category)
        .map_err(|e| MemoryOpError::storage(format!("reading index for '{category}'"), e))
        .map(Option::unwrap_or_default)
}

/// Recursively collect memory entries at and beneath `category` by walking
/// the index tree.
fn collect_entries(
    adapter: &dyn StorageAdapter,
    category: &CategoryPath,
    out: &mut Vec<crate::category::CategoryMemoryEntry>,
) -> Result<(), MemoryOpError> {
    let index = load_index_or_default(adapter, category)?;
    out.extend(index.memories);
    for sub in index.subcategories {
        collect_entries(adapter, &sub.path, out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// prune
// ---------------------------------------------------------------------------

/// Remove expired memories beneath a scope. With `dry_run`, reports what
/// would be removed without touching the filesystem.
pub fn prune(
    adapter: &dyn StorageAdapter,
    scope: Option<&str>,
    options: PruneOptions,
) -> Result<PruneResult, MemoryOpError> {
    let now = options.now.unwrap_or_else(Utc::now);
    let scope = match scope {
        Some(s) => CategoryPath::parse(s)?,
        None => CategoryPath::root(),
    };

    let mut entries = Vec::new();
    if scope.is_root() {
        let root_index = load_index_or_default(adapter, &scope)?;
        for sub in &root_index.subcategories {
            collect_entries(adapter, &sub.path, &mut entries)?;
        }
    } else {
        if adapter
            .load_index(&scope)
            .map_err(|e| MemoryOpError::storage(format!("reading index for '{scope}'"), e))?
            .is_none()
        {
            return Err(MemoryOpError::CategoryNotFound(scope.to_string()));
        }
        collect_entries(adapter, &scope, &mut entries)?;
    }

    let mut expired = Vec::new();
    for entry in entries {
        let Some(memory) = adapter
            .load_memory(&entry.path)
            .map_err(|e| MemoryOpError::storage(format!("reading memory '{}'", entry.path), e))?
        else {
            continue;
        };
        if memory.is_expired(now) {
            expired.push(PrunedMemory {
                path: entry.path,
                expired_at: memory.metadata.expires_at.unwrap(),
            });
        }
    }
    expired.sort_by(|a, b| a.path.cmp(&b.path));

    if options.dry_run {
        return Ok(PruneResult { scope, dry_run: true, pruned: expired });
    }

    let mut removed_any = false;
    for pruned in &expired {
        adapter.remove_memory(&pruned.path).map_err(|e| {
            MemoryOpError::storage(
                format!("pruning '{}' failed part-way; run reindex", pruned.path),
                e,
            )
        })?;
        removed_any = true;
    }
    if removed_any {
        adapter.reindex(&scope).map_err(|e| {
            MemoryOpError::storage(
                format!("pruned memories but reindexing '{scope}' failed; run reindex"),
                e,
            )
        })?;
        info!(scope = %scope, pruned = expired.len(), "Pruned expired memories");
    }

    Ok(PruneResult { scope, dry_run: false, pruned: expired })
}

// ---------------------------------------------------------------------------
// recent
// ---------------------------------------------------------------------------

/// Most recently updated memories, newest first, with full content.
pub fn recent(
    adapter: &dyn StorageAdapter,
    options: RecentOptions,
) -> Result<RecentResult, MemoryOpError> {
    let now = options.now.unwrap_or_else(Utc::now);
    let scope = match &options.category {
        Some(s) => Some(CategoryPath::parse(s)?),
        None => None,
    };

    if options.limit == 0 {
        return Ok(RecentResult { category: scope, memories: Vec::new() });
    }

    let mut entries = Vec::new();
    match &scope {
        Some(category) => {
            if adapter
                .load_index(category)
                .map_err(|e| MemoryOpError::storage(format!("reading index for '{category}'"), e))?
                .is_none()
            {
                return Err(MemoryOpError::CategoryNotFound(category.to_string()));
            }
            collect_entries(adapter, category, &mut entries)?;
        }
        None => {
            let root_index = load_index_or_default(adapter, &CategoryPath::root())?;
            for sub in &root_index.subcategories {
                collect_entries(adapter, &sub.path, &mut entries)?;
            }
        }
    }

    // Newest first; entries without a recorded update time sort last.
    entries.sort_by(|a, b| match (b.updated_at, a.updated_at) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => a.path.cmp(&b.path),
    });

    let mut memories = Vec::new();
    for entry in entries {
        if memories.len() >= options.limit {
            break;
        }
        let Some(memory) = adapter
            .load_memory(&entry.path)
            .map_err(|e| MemoryOpError::storage(format!("reading memory '{}'", entry.path), e))?
        else {
            continue;
        };
        if !options.include_expired && memory.is_expired(now) {
            continue;
        }
        memories.push(memory);
    }

    Ok(RecentResult { category: scope, memories })
}

// ---------------------------------------------------------------------------
// reindex
// ---------------------------------------------------------------------------

/// Rebuild indexes at and beneath a scope (the whole store by default).
pub fn reindex(
    adapter: &dyn StorageAdapter,
    scope: Option<&str>,
) -> Result<ReindexReport, MemoryOpError> {
    let scope = match scope {
        Some(s) => CategoryPath::parse(s)?,
        None => CategoryPath::root(),
    };
    adapter
        .reindex(&scope)
        .map_err(|e| MemoryOpError::storage(format!("reindexing '{scope}'"), e))
}

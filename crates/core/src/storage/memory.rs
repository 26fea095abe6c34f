//! In-memory storage adapter.
//!
//! Mirrors the two-level model of the filesystem backend — memory records
//! plus separately materialized category indexes — so index divergence and
//! reindex recovery behave the same way they do on disk. Used by tests and
//! by programmatic embedders that want a throwaway store.

use crate::category::{
    Category, CategoryMemoryEntry, ReindexReport, SubcategoryEntry, MAX_DESCRIPTION_LEN,
};
use crate::estimate::TokenEstimator;
use crate::memory::Memory;
use crate::path::{CategoryPath, MemoryPath};
use crate::storage::{AdapterError, CategoryStore, IndexStore, MemoryStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    memories: BTreeMap<MemoryPath, Memory>,
    categories: BTreeSet<CategoryPath>,
    indexes: BTreeMap<CategoryPath, Category>,
}

pub struct MemoryAdapter {
    state: Mutex<State>,
    estimator: Arc<dyn TokenEstimator>,
    /// Test seam: when set, `update_after_memory_write` fails.
    fail_index_updates: AtomicBool,
}

impl MemoryAdapter {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        let mut state = State::default();
        state.indexes.insert(CategoryPath::root(), Category::default());
        MemoryAdapter { state: Mutex::new(state), estimator, fail_index_updates: AtomicBool::new(false) }
    }

    /// Make every subsequent `update_after_memory_write` fail, simulating a
    /// write that lands on disk without its index entry.
    pub fn fail_index_updates(&self, fail: bool) {
        self.fail_index_updates.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a panic mid-mutation; tests should see it.
        self.state.lock().expect("memory adapter lock poisoned")
    }
}

impl State {
    fn category_exists(&self, path: &CategoryPath) -> bool {
        path.is_root() || self.categories.contains(path)
    }

    /// Direct (non-recursive) memory count for a category.
    fn direct_count(&self, category: &CategoryPath) -> usize {
        self.memories.keys().filter(|p| p.category() == category).count()
    }

    /// Refresh `category`'s subcategory entry in its parent index.
    fn refresh_parent_entry(&mut self, category: &CategoryPath) {
        let Some(parent) = category.parent() else { return };
        let count = self.direct_count(category);
        let index = self.indexes.entry(parent).or_default();
        let description = index
            .subcategories
            .iter()
            .find(|e| &e.path == category)
            .and_then(|e| e.description.clone());
        index.upsert_subcategory(SubcategoryEntry {
            path: category.clone(),
            memory_count: count,
            description,
        });
    }
}

// ---------------------------------------------------------------------------
// Memories facet
// ---------------------------------------------------------------------------

impl MemoryStore for MemoryAdapter {
    fn load_memory(&self, path: &MemoryPath) -> Result<Option<Memory>, AdapterError> {
        Ok(self.lock().memories.get(path).cloned())
    }

    fn save_memory(&self, memory: &Memory) -> Result<(), AdapterError> {
        let mut state = self.lock();
        let category = memory.path.category();
        if !state.category_exists(category) {
            return Err(AdapterError::NotFound(format!("category '{category}' does not exist")));
        }
        state.memories.insert(memory.path.clone(), memory.clone());
        Ok(())
    }

    fn remove_memory(&self, path: &MemoryPath) -> Result<(), AdapterError> {
        let mut state = self.lock();
        if state.memories.remove(path).is_none() {
            return Err(AdapterError::NotFound(format!("memory '{path}' does not exist")));
        }
        Ok(())
    }

    fn move_memory(&self, from: &MemoryPath, to: &MemoryPath) -> Result<(), AdapterError> {
        let mut state = self.lock();
        if !state.memories.contains_key(from) {
            return Err(AdapterError::NotFound(format!("memory '{from}' does not exist")));
        }
        if state.memories.contains_key(to) {
            return Err(AdapterError::AlreadyExists(format!("memory '{to}' already exists")));
        }
        if !state.category_exists(to.category()) {
            return Err(AdapterError::NotFound(format!(
                "category '{}' does not exist",
                to.category()
            )));
        }
        let mut memory = state.memories.remove(from).unwrap();
        memory.path = to.clone();
        state.memories.insert(to.clone(), memory);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Indexes facet
// ---------------------------------------------------------------------------

impl IndexStore for MemoryAdapter {
    fn load_index(&self, category: &CategoryPath) -> Result<Option<Category>, AdapterError> {
        let state = self.lock();
        if !state.category_exists(category) {
            return Ok(None);
        }
        Ok(state.indexes.get(category).cloned())
    }

    fn reindex(&self, scope: &CategoryPath) -> Result<ReindexReport, AdapterError> {
        let mut state = self.lock();
        if !state.category_exists(scope) {
            return Err(AdapterError::NotFound(format!("category '{scope}' does not exist")));
        }

        let mut report = ReindexReport::new(scope.clone());

        let in_scope: Vec<CategoryPath> = std::iter::once(CategoryPath::root())
            .chain(state.categories.iter().cloned())
            .filter(|c| scope.contains(c))
            .collect();

        for category in in_scope {
            let previous = state.indexes.get(&category).cloned().unwrap_or_default();

            let memories: Vec<CategoryMemoryEntry> = state
                .memories
                .iter()
                .filter(|(p, _)| p.category() == &category)
                .map(|(p, m)| CategoryMemoryEntry {
                    path: p.clone(),
                    token_estimate: self.estimator.estimate(&m.content),
                    summary: previous.memory_entry(p).and_then(|e| e.summary.clone()),
                    updated_at: Some(m.metadata.updated_at),
                })
                .collect();
            report.indexed_memories += memories.len();

            let subcategories: Vec<SubcategoryEntry> = state
                .categories
                .iter()
                .filter(|c| c.parent().as_ref() == Some(&category))
                .map(|c| SubcategoryEntry {
                    path: c.clone(),
                    memory_count: state.direct_count(c),
                    description: previous
                        .subcategory_entry(c)
                        .and_then(|e| e.description.clone()),
                })
                .collect();

            state.indexes.insert(category, Category::new(memories, subcategories));
            report.indexed_categories += 1;
        }

        if !scope.is_root() {
            state.refresh_parent_entry(scope);
        }
        Ok(report)
    }

    fn update_after_memory_write(&self, memory: &Memory) -> Result<(), AdapterError> {
        if self.fail_index_updates.load(Ordering::SeqCst) {
            return Err(AdapterError::Index("injected index failure".to_string()));
        }
        let mut state = self.lock();
        let parent = memory.path.category().clone();
        let token_estimate = self.estimator.estimate(&memory.content);

        let index = state.indexes.entry(parent.clone()).or_default();
        let summary = index.memory_entry(&memory.path).and_then(|e| e.summary.clone());
        index.upsert_memory(CategoryMemoryEntry {
            path: memory.path.clone(),
            token_estimate,
            summary,
            updated_at: Some(memory.metadata.updated_at),
        });

        state.refresh_parent_entry(&parent);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Categories facet
// ---------------------------------------------------------------------------

impl CategoryStore for MemoryAdapter {
    fn category_exists(&self, path: &CategoryPath) -> Result<bool, AdapterError> {
        Ok(self.lock().category_exists(path))
    }

    fn ensure_category(&self, path: &CategoryPath) -> Result<(), AdapterError> {
        let mut state = self.lock();
        let mut current = CategoryPath::root();
        for seg in path.segments() {
            current = current.child(seg.clone());
            if state.categories.insert(current.clone()) {
                state.indexes.entry(current.clone()).or_default();
                state.refresh_parent_entry(&current);
            }
        }
        Ok(())
    }

    fn delete_category(&self, path: &CategoryPath) -> Result<(), AdapterError> {
        let mut state = self.lock();
        if path.is_root() {
            return Err(AdapterError::InvalidState(
                "the store root cannot be deleted".to_string(),
            ));
        }
        if !state.category_exists(path) {
            return Err(AdapterError::NotFound(format!("category '{path}' does not exist")));
        }

        state.memories.retain(|p, _| !path.contains(p.category()));
        state.categories.retain(|c| !path.contains(c));
        state.indexes.retain(|c, _| !path.contains(c));
        if let Some(parent) = path.parent() {
            if let Some(index) = state.indexes.get_mut(&parent) {
                index.subcategories.retain(|e| &e.path != path);
            }
        }
        Ok(())
    }

    fn set_category_description(
        &self,
        path: &CategoryPath,
        description: Option<&str>,
    ) -> Result<(), AdapterError> {
        if path.is_root() {
            return Err(AdapterError::InvalidState(
                "root categories cannot carry descriptions".to_string(),
            ));
        }
        if let Some(desc) = description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(AdapterError::InvalidState(format!(
                    "description exceeds {MAX_DESCRIPTION_LEN} characters"
                )));
            }
        }
        let mut state = self.lock();
        if !state.category_exists(path) {
            return Err(AdapterError::NotFound(format!("category '{path}' does not exist")));
        }

        let count = state
            .indexes
            .get(&path.parent().unwrap_or_else(CategoryPath::root))
            .and_then(|i| i.subcategory_entry(path).map(|e| e.memory_count))
            .unwrap_or_else(|| state.direct_count(path));
        let parent = path.parent().unwrap_or_else(CategoryPath::root);
        let index = state.indexes.entry(parent).or_default();
        index.upsert_subcategory(SubcategoryEntry {
            path: path.clone(),
            memory_count: count,
            description: description.map(|s| s.to_string()),
        });
        Ok(())
    }
}

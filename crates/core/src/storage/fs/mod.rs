//! Filesystem storage adapter.
//!
//! Layout under a store root:
//!
//! ```text
//! <root>/memory/<segment>/.../<slug>.md   memory file (frontmatter + body)
//! <root>/memory/<segment>/.../index.yaml  category index
//! <root>/memory/index.yaml                synthetic root index
//! ```
//!
//! A category exists when its directory and its `index.yaml` are both
//! present. All writes go through write-to-temp-then-rename in the target
//! directory, so every file replacement is atomic.

pub mod frontmatter;
pub mod index_file;
mod reindex;

use crate::category::{
    Category, CategoryMemoryEntry, ReindexReport, SubcategoryEntry, MAX_DESCRIPTION_LEN,
};
use crate::estimate::TokenEstimator;
use crate::memory::Memory;
use crate::path::{CategoryPath, MemoryPath};
use crate::storage::{AdapterError, CategoryStore, IndexStore, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const INDEX_FILE_NAME: &str = "index.yaml";
pub const MEMORY_DIR_NAME: &str = "memory";
pub const MEMORY_FILE_EXT: &str = "md";

pub struct FsAdapter {
    root: PathBuf,
    estimator: Arc<dyn TokenEstimator>,
}

impl FsAdapter {
    pub fn new(root: PathBuf, estimator: Arc<dyn TokenEstimator>) -> Self {
        FsAdapter { root, estimator }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    // -- layout ------------------------------------------------------------

    pub(crate) fn memory_root(&self) -> PathBuf {
        self.root.join(MEMORY_DIR_NAME)
    }

    pub(crate) fn category_dir(&self, category: &CategoryPath) -> PathBuf {
        let mut dir = self.memory_root();
        for seg in category.segments() {
            dir.push(seg.as_str());
        }
        dir
    }

    fn memory_file(&self, path: &MemoryPath) -> PathBuf {
        self.category_dir(path.category()).join(format!("{}.{}", path.slug(), MEMORY_FILE_EXT))
    }

    fn index_path(&self, category: &CategoryPath) -> PathBuf {
        self.category_dir(category).join(INDEX_FILE_NAME)
    }

    // -- primitives --------------------------------------------------------

    /// Atomic file replacement: write a sibling temp file, then rename.
    pub(crate) fn atomic_write(&self, path: &Path, contents: &str) -> Result<(), AdapterError> {
        let dir = path.parent().ok_or_else(|| {
            AdapterError::InvalidState(format!("no parent directory for {}", path.display()))
        })?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
        let tmp = dir.join(format!(".{}.{}.tmp", name, std::process::id()));

        std::fs::write(&tmp, contents)
            .map_err(|e| AdapterError::io_write(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(AdapterError::io_write(format!("replacing {}", path.display()), e));
        }
        Ok(())
    }

    /// Read and parse an index file; `None` if the file does not exist.
    pub(crate) fn read_index(
        &self,
        category: &CategoryPath,
    ) -> Result<Option<Category>, AdapterError> {
        let path = self.index_path(category);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AdapterError::io_read(format!("reading {}", path.display()), e));
            }
        };
        index_file::parse(&text)
            .map(Some)
            .map_err(|e| AdapterError::Index(format!("{}: {e}", path.display())))
    }

    pub(crate) fn write_index(
        &self,
        category: &CategoryPath,
        index: &Category,
    ) -> Result<(), AdapterError> {
        self.atomic_write(&self.index_path(category), &index_file::render(index))
    }

    /// Direct memory count for a category, from its index when present.
    fn direct_memory_count(&self, category: &CategoryPath) -> usize {
        self.read_index(category).ok().flatten().map(|c| c.memories.len()).unwrap_or(0)
    }

    /// Refresh (or insert) `category`'s subcategory entry in its parent's
    /// index, preserving any authored description.
    fn refresh_parent_entry(&self, category: &CategoryPath) -> Result<(), AdapterError> {
        let Some(parent) = category.parent() else {
            return Ok(());
        };
        let mut parent_index = self.read_index(&parent)?.unwrap_or_default();
        let description =
            parent_index.subcategory_entry(category).and_then(|e| e.description.clone());
        parent_index.upsert_subcategory(SubcategoryEntry {
            path: category.clone(),
            memory_count: self.direct_memory_count(category),
            description,
        });
        self.write_index(&parent, &parent_index)
    }
}

// ---------------------------------------------------------------------------
// Memories facet
// ---------------------------------------------------------------------------

impl MemoryStore for FsAdapter {
    fn load_memory(&self, path: &MemoryPath) -> Result<Option<Memory>, AdapterError> {
        let file = self.memory_file(path);
        let text = match std::fs::read_to_string(&file) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AdapterError::io_read(format!("reading {}", file.display()), e));
            }
        };
        let doc = frontmatter::parse(&text).map_err(|e| {
            AdapterError::InvalidState(format!("malformed memory file {}: {e}", file.display()))
        })?;
        let memory = Memory::new(path.clone(), doc.metadata, doc.content).map_err(|e| {
            AdapterError::InvalidState(format!("invalid memory file {}: {e}", file.display()))
        })?;
        Ok(Some(memory))
    }

    fn save_memory(&self, memory: &Memory) -> Result<(), AdapterError> {
        let category = memory.path.category();
        if !self.category_exists(category)? {
            return Err(AdapterError::NotFound(format!("category '{category}' does not exist")));
        }

        // Unknown frontmatter fields from an existing file survive the rewrite.
        let file = self.memory_file(&memory.path);
        let extra = std::fs::read_to_string(&file)
            .ok()
            .and_then(|t| frontmatter::parse(&t).ok())
            .map(|doc| doc.extra)
            .unwrap_or_default();

        self.atomic_write(&file, &frontmatter::render(&memory.metadata, &memory.content, &extra))
    }

    fn remove_memory(&self, path: &MemoryPath) -> Result<(), AdapterError> {
        let file = self.memory_file(path);
        if !file.is_file() {
            return Err(AdapterError::NotFound(format!("memory '{path}' does not exist")));
        }
        std::fs::remove_file(&file)
            .map_err(|e| AdapterError::io_write(format!("removing {}", file.display()), e))
    }

    fn move_memory(&self, from: &MemoryPath, to: &MemoryPath) -> Result<(), AdapterError> {
        let src = self.memory_file(from);
        let dst = self.memory_file(to);
        if !src.is_file() {
            return Err(AdapterError::NotFound(format!("memory '{from}' does not exist")));
        }
        if dst.is_file() {
            return Err(AdapterError::AlreadyExists(format!("memory '{to}' already exists")));
        }
        if !self.category_exists(to.category())? {
            return Err(AdapterError::NotFound(format!(
                "category '{}' does not exist",
                to.category()
            )));
        }
        std::fs::rename(&src, &dst)
            .map_err(|e| AdapterError::io_write(format!("moving {} to {}", from, to), e))
    }
}

// ---------------------------------------------------------------------------
// Indexes facet
// ---------------------------------------------------------------------------

impl IndexStore for FsAdapter {
    fn load_index(&self, category: &CategoryPath) -> Result<Option<Category>, AdapterError> {
        if !category.is_root() && !self.category_exists(category)? {
            return Ok(None);
        }
        self.read_index(category)
    }

    fn reindex(&self, scope: &CategoryPath) -> Result<ReindexReport, AdapterError> {
        reindex::run(self, scope)
    }

    fn update_after_memory_write(&self, memory: &Memory) -> Result<(), AdapterError> {
        let parent = memory.path.category();
        let mut index = self.read_index(parent)?.unwrap_or_default();

        // Summaries are authored, never synthesized: carry the old one over.
        let summary = index.memory_entry(&memory.path).and_then(|e| e.summary.clone());
        index.upsert_memory(CategoryMemoryEntry {
            path: memory.path.clone(),
            token_estimate: self.estimator.estimate(&memory.content),
            summary,
            updated_at: Some(memory.metadata.updated_at),
        });
        self.write_index(parent, &index)?;

        debug!(memory = %memory.path, "Updated category index");
        self.refresh_parent_entry(parent)
    }
}

// ---------------------------------------------------------------------------
// Categories facet
// ---------------------------------------------------------------------------

impl CategoryStore for FsAdapter {
    fn category_exists(&self, path: &CategoryPath) -> Result<bool, AdapterError> {
        let dir = self.category_dir(path);
        Ok(dir.is_dir() && dir.join(INDEX_FILE_NAME).is_file())
    }

    fn ensure_category(&self, path: &CategoryPath) -> Result<(), AdapterError> {
        // Root scaffold first: memory/ plus the synthetic root index.
        let root_dir = self.memory_root();
        std::fs::create_dir_all(&root_dir)
            .map_err(|e| AdapterError::io_write(format!("creating {}", root_dir.display()), e))?;
        if self.read_index(&CategoryPath::root())?.is_none() {
            self.write_index(&CategoryPath::root(), &Category::default())?;
        }

        let mut current = CategoryPath::root();
        for seg in path.segments() {
            current = current.child(seg.clone());
            let dir = self.category_dir(&current);
            std::fs::create_dir_all(&dir)
                .map_err(|e| AdapterError::io_write(format!("creating {}", dir.display()), e))?;
            if self.read_index(&current)?.is_none() {
                self.write_index(&current, &Category::default())?;
            }

            // Register in the parent index unless already present.
            let parent = current.parent().unwrap_or_else(CategoryPath::root);
            let mut parent_index = self.read_index(&parent)?.unwrap_or_default();
            if parent_index.subcategory_entry(&current).is_none() {
                parent_index.upsert_subcategory(SubcategoryEntry {
                    path: current.clone(),
                    memory_count: self.direct_memory_count(&current),
                    description: None,
                });
                self.write_index(&parent, &parent_index)?;
            }
        }
        Ok(())
    }

    fn delete_category(&self, path: &CategoryPath) -> Result<(), AdapterError> {
        if path.is_root() {
            return Err(AdapterError::InvalidState(
                "the store root cannot be deleted".to_string(),
            ));
        }
        if !self.category_exists(path)? {
            return Err(AdapterError::NotFound(format!("category '{path}' does not exist")));
        }
        let dir = self.category_dir(path);
        std::fs::remove_dir_all(&dir)
            .map_err(|e| AdapterError::io_write(format!("removing {}", dir.display()), e))?;

        // Drop the entry from the parent index.
        let parent = path.parent().unwrap_or_else(CategoryPath::root);
        if let Some(mut parent_index) = self.read_index(&parent)? {
            parent_index.subcategories.retain(|e| &e.path != path);
            self.write_index(&parent, &parent_index)?;
        }
        debug!(category = %path, "Deleted category");
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
        if !self.category_exists(path)? {
            return Err(AdapterError::NotFound(format!("category '{path}' does not exist")));
        }

        let parent = path.parent().unwrap_or_else(CategoryPath::root);
        let mut parent_index = self.read_index(&parent)?.unwrap_or_default();
        let memory_count = parent_index
            .subcategory_entry(path)
            .map(|e| e.memory_count)
            .unwrap_or_else(|| self.direct_memory_count(path));
        parent_index.upsert_subcategory(SubcategoryEntry {
            path: path.clone(),
            memory_count,
            description: description.map(|s| s.to_string()),
        });
        self.write_index(&parent, &parent_index)
    }
}

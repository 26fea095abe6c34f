//! Storage port: the facet traits every backend implements.
//!
//! A scoped adapter is bound to exactly one store's root and exposes three
//! facets — memories, indexes, categories — behind the [`StorageAdapter`]
//! supertrait. The stores facet ([`StoreRegistryStore`]) exists only on the
//! root adapter, which owns the persisted store registry. Backends are
//! selected through an injected [`AdapterFactory`], so tests can wire in the
//! in-memory adapter without touching disk.

pub mod fs;
pub mod memory;

use crate::category::{Category, ReindexReport};
use crate::config::StoreDefinition;
use crate::memory::Memory;
use crate::path::{CategoryPath, MemoryPath, Slug};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Backend-neutral adapter failure. No variant leaks backend specifics
/// into its code; the cause chain carries the details.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("read failed: {message}")]
    IoRead {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("write failed: {message}")]
    IoWrite {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("index error: {0}")]
    Index(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl AdapterError {
    pub fn io_read(message: impl Into<String>, source: std::io::Error) -> Self {
        AdapterError::IoRead { message: message.into(), source: Some(source) }
    }

    pub fn io_write(message: impl Into<String>, source: std::io::Error) -> Self {
        AdapterError::IoWrite { message: message.into(), source: Some(source) }
    }

    /// Stable error code, independent of the Rust variant name.
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::NotFound(_) => "NOT_FOUND",
            AdapterError::AlreadyExists(_) => "ALREADY_EXISTS",
            AdapterError::IoRead { .. } => "IO_READ",
            AdapterError::IoWrite { .. } => "IO_WRITE",
            AdapterError::Index(_) => "INDEX_ERROR",
            AdapterError::InvalidState(_) => "INVALID_STATE",
        }
    }
}

// ---------------------------------------------------------------------------
// Scoped facets
// ---------------------------------------------------------------------------

/// Memories facet: raw memory persistence. Never filters by expiration —
/// expiry is an operation-level policy.
pub trait MemoryStore {
    /// `None` if absent.
    fn load_memory(&self, path: &MemoryPath) -> Result<Option<Memory>, AdapterError>;

    /// Create or overwrite. The parent category must already exist.
    fn save_memory(&self, memory: &Memory) -> Result<(), AdapterError>;

    /// Fails with `NotFound` if absent.
    fn remove_memory(&self, path: &MemoryPath) -> Result<(), AdapterError>;

    /// Atomic within the adapter. Fails if `from` is missing or `to` exists.
    fn move_memory(&self, from: &MemoryPath, to: &MemoryPath) -> Result<(), AdapterError>;
}

/// Indexes facet: derived category indexes.
pub trait IndexStore {
    /// The category's index; `None` if the category is missing.
    /// `CategoryPath::root()` loads the synthetic root index.
    fn load_index(&self, category: &CategoryPath) -> Result<Option<Category>, AdapterError>;

    /// Rebuild every index at and beneath `scope` from ground truth.
    /// Unreadable memory files are skipped and reported as warnings.
    fn reindex(&self, scope: &CategoryPath) -> Result<ReindexReport, AdapterError>;

    /// Incrementally reflect a single memory insertion/overwrite in the
    /// parent category's index (and the grandparent's memory count).
    fn update_after_memory_write(&self, memory: &Memory) -> Result<(), AdapterError>;
}

/// Categories facet: category lifecycle.
pub trait CategoryStore {
    fn category_exists(&self, path: &CategoryPath) -> Result<bool, AdapterError>;

    /// Create the category and all missing ancestors; idempotent.
    fn ensure_category(&self, path: &CategoryPath) -> Result<(), AdapterError>;

    /// Recursively remove the category, its subcategories, memories, and
    /// index entries.
    fn delete_category(&self, path: &CategoryPath) -> Result<(), AdapterError>;

    /// Set or clear the description (≤ 500 chars). Fails on the root path.
    fn set_category_description(
        &self,
        path: &CategoryPath,
        description: Option<&str>,
    ) -> Result<(), AdapterError>;
}

/// The scoped port: one adapter bound to one store's root.
pub trait StorageAdapter: MemoryStore + IndexStore + CategoryStore + Send + Sync {}

impl<T: MemoryStore + IndexStore + CategoryStore + Send + Sync> StorageAdapter for T {}

// ---------------------------------------------------------------------------
// Stores facet (root adapter only)
// ---------------------------------------------------------------------------

/// The persisted store registry: store name → definition.
pub type StoreRegistry = BTreeMap<Slug, StoreDefinition>;

/// Stores facet, present only on the root adapter.
pub trait StoreRegistryStore {
    fn load_registry(&self) -> Result<StoreRegistry, AdapterError>;
    fn save_registry(&self, registry: &StoreRegistry) -> Result<(), AdapterError>;
    fn remove_registry(&self) -> Result<(), AdapterError>;
}

// ---------------------------------------------------------------------------
// Adapter factory (injection point)
// ---------------------------------------------------------------------------

/// Stateless function producing a scoped adapter from a store definition.
/// Production wires in the filesystem factory; tests wire in a mock.
pub type AdapterFactory =
    Arc<dyn Fn(&StoreDefinition) -> Result<Arc<dyn StorageAdapter>, AdapterError> + Send + Sync>;

/// The production factory: filesystem adapters with the default estimator.
pub fn filesystem_factory() -> AdapterFactory {
    Arc::new(|definition| {
        let adapter = fs::FsAdapter::new(definition.path.clone(), crate::estimate::default_estimator());
        Ok(Arc::new(adapter) as Arc<dyn StorageAdapter>)
    })
}

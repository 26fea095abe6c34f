//! Cortex core — hierarchical, agent-addressable memory stores.
//!
//! The domain model (paths, memories, category indexes), the storage port
//! with its filesystem and in-memory adapters, the memory and category
//! operations, and the configuration/registry layer. Transports (CLI, MCP)
//! live in their own crates and call into this one.

pub mod category;
pub mod config;
pub mod cortex;
pub mod estimate;
pub mod memory;
pub mod ops;
pub mod path;
pub mod storage;

pub use category::{Category, CategoryMemoryEntry, ReindexReport, SubcategoryEntry};
pub use config::{CategoryMode, Config, ConfigError, CortexSettings, OutputFormat, StoreDefinition};
pub use cortex::{Cortex, CortexError};
pub use memory::{Memory, MemoryMetadata};
pub use path::{CategoryPath, MemoryPath, PathError, Slug};
pub use storage::{AdapterError, AdapterFactory, StorageAdapter};

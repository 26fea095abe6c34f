//! Shared scaffolding for operation and adapter integration tests.

use chrono::{DateTime, Utc};
use cortex_core::estimate::default_estimator;
use cortex_core::ops::memory::CreateMemoryInput;
use cortex_core::storage::fs::FsAdapter;
use cortex_core::storage::memory::MemoryAdapter;
use cortex_core::storage::{CategoryStore, StorageAdapter};
use cortex_core::Memory;
use std::path::Path;

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn memory_adapter() -> MemoryAdapter {
    MemoryAdapter::new(default_estimator())
}

pub fn fs_adapter(root: &Path) -> FsAdapter {
    FsAdapter::new(root.to_path_buf(), default_estimator())
}

pub fn input(content: &str) -> CreateMemoryInput {
    CreateMemoryInput {
        content: content.to_string(),
        source: "test".to_string(),
        tags: vec![],
        citations: vec![],
        expires_at: None,
    }
}

pub fn expiring_input(content: &str, expires_at: &str) -> CreateMemoryInput {
    CreateMemoryInput { expires_at: Some(ts(expires_at)), ..input(content) }
}

/// Create a category (free mode) and a memory inside it in one step.
pub fn seed_memory(adapter: &dyn StorageAdapter, path: &str, content: &str) -> Memory {
    seed_with(adapter, path, input(content), "2025-01-01T00:00:00Z")
}

pub fn seed_with(
    adapter: &dyn StorageAdapter,
    path: &str,
    input: CreateMemoryInput,
    now: &str,
) -> Memory {
    let parsed = cortex_core::MemoryPath::parse(path).expect("valid path");
    adapter.ensure_category(parsed.category()).expect("ensure category");
    cortex_core::ops::memory::create(adapter, path, input, Some(ts(now))).expect("create memory")
}

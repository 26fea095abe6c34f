//! Memory entity and metadata.
//!
//! Memories are immutable values: updates produce new `Memory` instances,
//! and the storage adapter persists whatever it is handed. Token estimates
//! are an adapter concern and never appear here.

use crate::path::{MemoryPath, Slug};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryValidationError {
    #[error("updatedAt {updated_at} precedes createdAt {created_at}")]
    UpdatedBeforeCreated { created_at: DateTime<Utc>, updated_at: DateTime<Utc> },
    #[error("source must be a non-empty string")]
    EmptySource,
    #[error("invalid tag '{0}': tags are lowercase slugs")]
    InvalidTag(String),
    #[error("duplicate tag '{0}'")]
    DuplicateTag(String),
    #[error("citations must be non-empty strings")]
    EmptyCitation,
}

impl MemoryValidationError {
    pub fn code(&self) -> &'static str {
        "INVALID_INPUT"
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Frontmatter metadata carried by every memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Origin of the memory, e.g. "cli", "mcp", "user".
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// File paths, URLs, or free identifiers backing the memory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
}

impl MemoryMetadata {
    /// Validate the cross-field invariants.
    pub fn validate(&self) -> Result<(), MemoryValidationError> {
        if self.updated_at < self.created_at {
            return Err(MemoryValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        if self.source.trim().is_empty() {
            return Err(MemoryValidationError::EmptySource);
        }
        let mut seen = std::collections::BTreeSet::new();
        for tag in &self.tags {
            if Slug::parse(tag).is_err() {
                return Err(MemoryValidationError::InvalidTag(tag.clone()));
            }
            if !seen.insert(tag.as_str()) {
                return Err(MemoryValidationError::DuplicateTag(tag.clone()));
            }
        }
        if self.citations.iter().any(|c| c.trim().is_empty()) {
            return Err(MemoryValidationError::EmptyCitation);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A single markdown document with frontmatter metadata, addressable by a
/// [`MemoryPath`] within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Memory {
    pub path: MemoryPath,
    pub metadata: MemoryMetadata,
    pub content: String,
}

impl Memory {
    /// Construct a memory, validating the metadata invariants.
    pub fn new(
        path: MemoryPath,
        metadata: MemoryMetadata,
        content: String,
    ) -> Result<Self, MemoryValidationError> {
        metadata.validate()?;
        Ok(Memory { path, metadata, content })
    }

    /// A memory is expired iff `expires_at` is set and `expires_at <= now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.metadata.expires_at, Some(at) if at <= now)
    }
}

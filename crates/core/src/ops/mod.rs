//! Domain operations over a scoped storage adapter.
//!
//! Operations validate their inputs before any I/O, run the documented
//! read/mutate/index-update sequence against the adapter, and return typed
//! results. Adapter failures are wrapped with operation-level codes and an
//! actionable message; when index state may have diverged the message says
//! to run a reindex.

pub mod category;
pub mod memory;

use crate::path::PathError;
use crate::storage::AdapterError;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Memory operation errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MemoryOpError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("memory '{0}' not found")]
    MemoryNotFound(String),
    #[error("memory '{path}' expired at {expired_at}")]
    MemoryExpired { path: String, expired_at: DateTime<Utc> },
    #[error("destination '{0}' already exists")]
    DestinationExists(String),
    #[error("category '{0}' does not exist; create it first")]
    CategoryNotFound(String),
    #[error("{message}")]
    Storage {
        message: String,
        #[source]
        source: AdapterError,
    },
}

impl MemoryOpError {
    pub fn code(&self) -> &'static str {
        match self {
            MemoryOpError::InvalidPath(_) => "INVALID_PATH",
            MemoryOpError::InvalidInput(_) => "INVALID_INPUT",
            MemoryOpError::MemoryNotFound(_) => "MEMORY_NOT_FOUND",
            MemoryOpError::MemoryExpired { .. } => "MEMORY_EXPIRED",
            MemoryOpError::DestinationExists(_) => "DESTINATION_EXISTS",
            MemoryOpError::CategoryNotFound(_) => "CATEGORY_NOT_FOUND",
            MemoryOpError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    pub(crate) fn storage(message: impl Into<String>, source: AdapterError) -> Self {
        MemoryOpError::Storage { message: message.into(), source }
    }
}

// ---------------------------------------------------------------------------
// Category operation errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CategoryOpError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("{0}")]
    InvalidInput(String),
    #[error("operation not allowed on the root category")]
    RootNotAllowed,
    #[error("category '{0}' is protected by the store configuration")]
    Protected(String),
    #[error("category '{path}' violates the store's category mode: {message}")]
    ModeViolation { path: String, message: String },
    #[error("{message}")]
    Storage {
        message: String,
        #[source]
        source: AdapterError,
    },
}

impl CategoryOpError {
    pub fn code(&self) -> &'static str {
        match self {
            CategoryOpError::InvalidPath(_) => "INVALID_PATH",
            CategoryOpError::InvalidInput(_) => "INVALID_INPUT",
            CategoryOpError::RootNotAllowed => "ROOT_CATEGORY_NOT_ALLOWED",
            CategoryOpError::Protected(_) => "CATEGORY_PROTECTED",
            CategoryOpError::ModeViolation { .. } => "CATEGORY_MODE_VIOLATION",
            CategoryOpError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    pub(crate) fn storage(message: impl Into<String>, source: AdapterError) -> Self {
        CategoryOpError::Storage { message: message.into(), source }
    }
}

// ---------------------------------------------------------------------------
// Three-valued patch
// ---------------------------------------------------------------------------

/// Update field with three states: leave untouched, clear, or set.
///
/// A plain `Option` cannot distinguish "not provided" from "set to none",
/// which `update`'s `expires_at` semantics require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

// Hand-written so `Patch<T>: Default` holds without `T: Default`.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone> Patch<T> {
    /// Resolve against the existing value.
    pub fn apply(&self, existing: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => existing,
            Patch::Clear => None,
            Patch::Set(value) => Some(value.clone()),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }
}

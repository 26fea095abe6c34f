//! Slug and path value types.
//!
//! Every identifier crossing into the domain is validated at construction:
//! store names, category segments, and memory names are [`Slug`]s; category
//! and memory addresses are [`CategoryPath`] and [`MemoryPath`]. Internal
//! code never manipulates raw strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("invalid segment '{0}': expected lowercase slug (a-z, 0-9, single dashes)")]
    InvalidSegment(String),
    #[error("memory path '{0}' has no category: memories live inside at least one category")]
    MissingCategory(String),
}

impl PathError {
    /// Stable error code, independent of the Rust type name.
    pub fn code(&self) -> &'static str {
        "INVALID_PATH"
    }
}

// ---------------------------------------------------------------------------
// Slug
// ---------------------------------------------------------------------------

/// Lowercase identifier: `[a-z0-9]+` chunks joined by single dashes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slug(String);

impl Slug {
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if !is_valid_slug(s) {
            return Err(PathError::InvalidSegment(s.to_string()));
        }
        Ok(Slug(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `^[a-z0-9]+(-[a-z0-9]+)*$` without pulling in a regex engine.
fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.split('-').all(|chunk| {
            !chunk.is_empty() && chunk.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

// ---------------------------------------------------------------------------
// CategoryPath
// ---------------------------------------------------------------------------

/// Ordered sequence of slug segments; empty = store root.
///
/// Normalization drops empty segments, so `"a//b"` and `"/a/b"` both
/// canonicalize to `"a/b"`. Equality is equality of the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryPath(Vec<Slug>);

impl CategoryPath {
    /// The store root (zero segments).
    pub fn root() -> Self {
        CategoryPath(Vec::new())
    }

    /// Parse a `/`-separated category path. Empty segments are dropped;
    /// an entirely empty input yields the root path.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for seg in s.split('/') {
            if seg.is_empty() {
                continue;
            }
            segments.push(Slug::parse(seg)?);
        }
        Ok(CategoryPath(segments))
    }

    pub fn segments(&self) -> &[Slug] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path; `None` for the root.
    pub fn parent(&self) -> Option<CategoryPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(CategoryPath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// First segment; `None` for the root.
    pub fn root_segment(&self) -> Option<&Slug> {
        self.0.first()
    }

    /// Extend with one more segment.
    pub fn child(&self, segment: Slug) -> CategoryPath {
        let mut segments = self.0.clone();
        segments.push(segment);
        CategoryPath(segments)
    }

    /// True if `self` equals `other` or is an ancestor of it.
    pub fn contains(&self, other: &CategoryPath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Deepest path that is an ancestor-or-self of both inputs.
    pub fn common_ancestor(&self, other: &CategoryPath) -> CategoryPath {
        let shared = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.clone())
            .collect();
        CategoryPath(shared)
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(seg.as_str())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPath
// ---------------------------------------------------------------------------

/// Address of a memory: a non-root category plus a slug.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryPath {
    category: CategoryPath,
    slug: Slug,
}

impl MemoryPath {
    pub fn new(category: CategoryPath, slug: Slug) -> Result<Self, PathError> {
        if category.is_root() {
            return Err(PathError::MissingCategory(slug.as_str().to_string()));
        }
        Ok(MemoryPath { category, slug })
    }

    /// Parse `category/.../slug`. The final segment is the memory slug;
    /// at least one category segment must remain after normalization.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for seg in s.split('/') {
            if seg.is_empty() {
                continue;
            }
            segments.push(Slug::parse(seg)?);
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        let slug = segments.pop().unwrap();
        if segments.is_empty() {
            return Err(PathError::MissingCategory(s.to_string()));
        }
        Ok(MemoryPath { category: CategoryPath(segments), slug })
    }

    pub fn category(&self) -> &CategoryPath {
        &self.category
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }
}

impl fmt::Display for MemoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.slug)
    }
}

// ---------------------------------------------------------------------------
// Serde: all three types serialize as their canonical string form
// ---------------------------------------------------------------------------

macro_rules! string_serde {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ty::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Slug);
string_serde!(CategoryPath);
string_serde!(MemoryPath);

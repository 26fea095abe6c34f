//! Memory file codec: `---`-delimited YAML frontmatter plus markdown body.
//!
//! Recognized fields are camelCase (`createdAt`, `updatedAt`, `tags`,
//! `source`, `expiresAt`, `citations`). Unknown fields are preserved on
//! rewrite but never surfaced to the domain.

use crate::memory::MemoryMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ExtraFields = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("missing opening '---' delimiter")]
    MissingOpen,
    #[error("missing closing '---' delimiter")]
    MissingClose,
    #[error("invalid frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A parsed memory file: domain metadata, body, and any unrecognized
/// frontmatter fields to carry through the next write.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDocument {
    pub metadata: MemoryMetadata,
    pub content: String,
    pub extra: ExtraFields,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatter {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tags: Vec<String>,
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    citations: Vec<String>,
    #[serde(flatten)]
    extra: ExtraFields,
}

/// Split a memory file into its frontmatter block and body.
///
/// The file must begin with a `---` line; the block runs to the next `---`
/// line. The body is everything after the closing delimiter.
pub fn parse(text: &str) -> Result<MemoryDocument, FrontmatterError> {
    let rest = text.strip_prefix("---\n").ok_or(FrontmatterError::MissingOpen)?;

    let (yaml, content) = if let Some(body) = rest.strip_prefix("---\n") {
        // Empty frontmatter block
        ("", body)
    } else if let Some(idx) = rest.find("\n---\n") {
        (&rest[..idx + 1], &rest[idx + 5..])
    } else if let Some(stripped) = rest.strip_suffix("\n---") {
        // Closing delimiter at EOF with no trailing newline
        (&rest[..stripped.len() + 1], "")
    } else {
        return Err(FrontmatterError::MissingClose);
    };

    let fm: FrontMatter = serde_yaml::from_str(yaml)?;
    Ok(MemoryDocument {
        metadata: MemoryMetadata {
            created_at: fm.created_at,
            updated_at: fm.updated_at,
            tags: fm.tags,
            source: fm.source,
            expires_at: fm.expires_at,
            citations: fm.citations,
        },
        content: content.to_string(),
        extra: fm.extra,
    })
}

/// Render a memory file. `parse(render(doc))` yields an equal document.
pub fn render(metadata: &MemoryMetadata, content: &str, extra: &ExtraFields) -> String {
    let fm = FrontMatter {
        created_at: metadata.created_at,
        updated_at: metadata.updated_at,
        tags: metadata.tags.clone(),
        source: metadata.source.clone(),
        expires_at: metadata.expires_at,
        citations: metadata.citations.clone(),
        extra: extra.clone(),
    };
    // Serializing a plain struct-to-mapping cannot fail.
    let yaml = serde_yaml::to_string(&fm).expect("frontmatter serialization cannot fail");
    format!("---\n{yaml}---\n{content}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn sample_metadata() -> MemoryMetadata {
        MemoryMetadata {
            created_at: ts("2025-01-01T00:00:00Z"),
            updated_at: ts("2025-02-01T12:30:00Z"),
            tags: vec!["alpha".to_string(), "beta".to_string()],
            source: "cli".to_string(),
            expires_at: Some(ts("2030-01-01T00:00:00Z")),
            citations: vec!["docs/design.md".to_string()],
        }
    }

    #[test]
    fn round_trips_full_metadata() {
        let md = sample_metadata();
        let text = render(&md, "# Title\n\nbody text\n", &ExtraFields::new());
        let doc = parse(&text).unwrap();
        assert_eq!(doc.metadata, md);
        assert_eq!(doc.content, "# Title\n\nbody text\n");
        assert!(doc.extra.is_empty());
    }

    #[test]
    fn round_trips_empty_content() {
        let md = sample_metadata();
        let text = render(&md, "", &ExtraFields::new());
        let doc = parse(&text).unwrap();
        assert_eq!(doc.content, "");
        assert_eq!(doc.metadata, md);
    }

    #[test]
    fn round_trips_without_optional_fields() {
        let mut md = sample_metadata();
        md.expires_at = None;
        md.citations = vec![];
        md.tags = vec![];
        let text = render(&md, "x", &ExtraFields::new());
        // Omitted optionals stay omitted.
        assert!(!text.contains("expiresAt"));
        assert!(!text.contains("citations"));
        let doc = parse(&text).unwrap();
        assert_eq!(doc.metadata, md);
    }

    #[test]
    fn uses_camel_case_field_names() {
        let text = render(&sample_metadata(), "", &ExtraFields::new());
        assert!(text.contains("createdAt:"));
        assert!(text.contains("updatedAt:"));
        assert!(text.contains("expiresAt:"));
    }

    #[test]
    fn preserves_unknown_fields() {
        let text = "---\ncreatedAt: 2025-01-01T00:00:00Z\nupdatedAt: 2025-01-01T00:00:00Z\ntags: []\nsource: test\ncustomField: keep-me\n---\nbody";
        let doc = parse(text).unwrap();
        assert_eq!(
            doc.extra.get("customField"),
            Some(&serde_yaml::Value::String("keep-me".to_string()))
        );

        let rewritten = render(&doc.metadata, &doc.content, &doc.extra);
        assert!(rewritten.contains("customField: keep-me"));
        let reparsed = parse(&rewritten).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn rejects_missing_delimiters() {
        assert!(matches!(parse("no frontmatter"), Err(FrontmatterError::MissingOpen)));
        assert!(matches!(
            parse("---\ncreatedAt: 2025-01-01T00:00:00Z\n"),
            Err(FrontmatterError::MissingClose)
        ));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let text = "---\ncreatedAt: [not-a-date\n---\nbody";
        assert!(matches!(parse(text), Err(FrontmatterError::Yaml(_))));
    }

    #[test]
    fn accepts_closing_delimiter_at_eof() {
        let text = "---\ncreatedAt: 2025-01-01T00:00:00Z\nupdatedAt: 2025-01-01T00:00:00Z\ntags: []\nsource: test\n---";
        let doc = parse(text).unwrap();
        assert_eq!(doc.content, "");
    }
}

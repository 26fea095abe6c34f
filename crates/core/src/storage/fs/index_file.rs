//! Category index codec: the `index.yaml` file.
//!
//! Two sections, `memories` and `subcategories`, both sorted by path on
//! write. Field names are snake_case on the wire (`token_estimate`,
//! `memory_count`, `updated_at`).

use crate::category::Category;

#[derive(Debug, thiserror::Error)]
#[error("invalid index file: {0}")]
pub struct IndexFileError(#[from] serde_yaml::Error);

/// Parse an `index.yaml` document.
pub fn parse(text: &str) -> Result<Category, IndexFileError> {
    let mut category: Category = serde_yaml::from_str(text)?;
    // Tolerate hand-edited files: re-establish sort order on read.
    category.normalize();
    Ok(category)
}

/// Render an `index.yaml` document. Entries are sorted by path in both
/// sections; `parse(render(c))` yields an equal value.
pub fn render(category: &Category) -> String {
    let mut sorted = category.clone();
    sorted.normalize();
    serde_yaml::to_string(&sorted).expect("index serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{CategoryMemoryEntry, SubcategoryEntry};
    use crate::path::{CategoryPath, MemoryPath};

    fn sample() -> Category {
        Category::new(
            vec![
                CategoryMemoryEntry {
                    path: MemoryPath::parse("project/notes/alpha").unwrap(),
                    token_estimate: 42,
                    summary: Some("kickoff notes".to_string()),
                    updated_at: Some("2025-03-01T08:00:00Z".parse().unwrap()),
                },
                CategoryMemoryEntry {
                    path: MemoryPath::parse("project/notes/beta").unwrap(),
                    token_estimate: 7,
                    summary: None,
                    updated_at: None,
                },
            ],
            vec![SubcategoryEntry {
                path: CategoryPath::parse("project/notes/archive").unwrap(),
                memory_count: 3,
                description: Some("Old notes".to_string()),
            }],
        )
    }

    #[test]
    fn round_trips() {
        let cat = sample();
        let text = render(&cat);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, cat);
    }

    #[test]
    fn uses_snake_case_wire_fields() {
        let text = render(&sample());
        assert!(text.contains("token_estimate:"));
        assert!(text.contains("memory_count:"));
        assert!(text.contains("updated_at:"));
    }

    #[test]
    fn render_sorts_entries() {
        let mut cat = sample();
        cat.memories.reverse();
        cat.subcategories.reverse();
        let text = render(&cat);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.memories[0].path.to_string(), "project/notes/alpha");
    }

    #[test]
    fn parses_empty_sections() {
        let parsed = parse("memories: []\nsubcategories: []\n").unwrap();
        assert!(parsed.memories.is_empty());
        assert!(parsed.subcategories.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse("memories: 12\n").is_err());
    }
}

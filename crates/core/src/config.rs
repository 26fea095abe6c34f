//! Merged configuration: settings plus the store registry.
//!
//! The config is a single TOML document (`config.toml`) with two top-level
//! sections, `[settings]` and `[stores.<name>]`. It is read once at process
//! start and immutable for the rest of the run; reload is a restart.
//!
//! Parsing happens in two stages: serde deserializes a raw mirror, then
//! validation converts it into the typed [`Config`], so failures can name
//! the offending store and field instead of surfacing a serde error.

use crate::category::MAX_DESCRIPTION_LEN;
use crate::path::Slug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found at {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read config at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: store '{store}', field '{field}': {message}")]
    Validation { store: String, field: String, message: String },
    #[error("store '{store}': path '{path}' is not absolute")]
    InvalidStorePath { store: String, path: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::Io { .. } | ConfigError::Parse { .. } => "CONFIG_PARSE_FAILED",
            ConfigError::Validation { .. } => "CONFIG_VALIDATION_FAILED",
            ConfigError::InvalidStorePath { .. } => "INVALID_STORE_PATH",
        }
    }
}

// ---------------------------------------------------------------------------
// Typed model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Yaml,
    Json,
    Toon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Filesystem,
}

/// Per-store policy controlling which category paths may be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMode {
    /// Any path.
    Free,
    /// Only under explicitly-defined root categories.
    Subcategories,
    /// Only exact paths present in the configured hierarchy.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CortexSettings {
    pub default_store: Slug,
    pub output_format: OutputFormat,
}

impl Default for CortexSettings {
    fn default() -> Self {
        CortexSettings {
            default_store: Slug::parse("default").unwrap(),
            output_format: OutputFormat::Yaml,
        }
    }
}

/// Recursive configured category hierarchy: segment → node.
pub type CategoryHierarchy = BTreeMap<Slug, CategoryNode>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryNode {
    pub description: Option<String>,
    pub subcategories: CategoryHierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDefinition {
    pub kind: StoreKind,
    /// Absolute path of the store root (filesystem backend).
    pub path: PathBuf,
    pub description: Option<String>,
    pub category_mode: CategoryMode,
    pub categories: CategoryHierarchy,
}

impl StoreDefinition {
    pub fn filesystem(path: PathBuf) -> Self {
        StoreDefinition {
            kind: StoreKind::Filesystem,
            path,
            description: None,
            category_mode: CategoryMode::Free,
            categories: CategoryHierarchy::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub settings: CortexSettings,
    pub stores: BTreeMap<Slug, StoreDefinition>,
}

// ---------------------------------------------------------------------------
// Hierarchy lookups (category-mode policy support)
// ---------------------------------------------------------------------------

/// Walk `segments` down the hierarchy; `true` iff the exact node exists.
pub fn hierarchy_contains(hierarchy: &CategoryHierarchy, segments: &[Slug]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    match hierarchy.get(first) {
        None => false,
        Some(node) => rest.is_empty() || hierarchy_contains(&node.subcategories, rest),
    }
}

/// `true` iff `segment` is one of the configured root categories.
pub fn hierarchy_has_root(hierarchy: &CategoryHierarchy, segment: &Slug) -> bool {
    hierarchy.contains_key(segment)
}

// ---------------------------------------------------------------------------
// Raw mirror (wire format)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    stores: BTreeMap<String, RawStore>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSettings {
    #[serde(default = "default_store_name")]
    default_store: String,
    #[serde(default = "default_output_format")]
    output_format: String,
}

fn default_store_name() -> String {
    "default".to_string()
}

fn default_output_format() -> String {
    "yaml".to_string()
}

impl Default for RawSettings {
    fn default() -> Self {
        RawSettings {
            default_store: default_store_name(),
            output_format: default_output_format(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RawStore {
    #[serde(default = "default_kind")]
    kind: String,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default = "default_mode")]
    category_mode: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    categories: BTreeMap<String, RawCategoryNode>,
}

fn default_kind() -> String {
    "filesystem".to_string()
}

fn default_mode() -> String {
    "free".to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawCategoryNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    subcategories: BTreeMap<String, RawCategoryNode>,
}

// ---------------------------------------------------------------------------
// Parse / validate
// ---------------------------------------------------------------------------

impl Config {
    /// Parse and validate a merged config document.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse { source })?;
        Config::from_raw(raw)
    }

    /// Read, parse, and validate `config.toml` under `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Config, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound { path });
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Config::parse(&text)
    }

    /// Serialize back to the wire format. `parse(serialize(c))` equals `c`
    /// for any valid config.
    pub fn to_toml_string(&self) -> String {
        let raw = self.to_raw();
        // A valid Config always maps to serializable TOML.
        toml::to_string_pretty(&raw).expect("config serialization cannot fail")
    }

    fn from_raw(raw: RawConfig) -> Result<Config, ConfigError> {
        let default_store =
            Slug::parse(&raw.settings.default_store).map_err(|e| ConfigError::Validation {
                store: String::new(),
                field: "settings.default_store".to_string(),
                message: e.to_string(),
            })?;
        let output_format = match raw.settings.output_format.as_str() {
            "yaml" => OutputFormat::Yaml,
            "json" => OutputFormat::Json,
            "toon" => OutputFormat::Toon,
            other => {
                return Err(ConfigError::Validation {
                    store: String::new(),
                    field: "settings.output_format".to_string(),
                    message: format!("unknown output format '{other}' (yaml, json, toon)"),
                });
            }
        };

        let mut stores = BTreeMap::new();
        for (name, raw_store) in raw.stores {
            let slug = Slug::parse(&name).map_err(|e| ConfigError::Validation {
                store: name.clone(),
                field: "name".to_string(),
                message: e.to_string(),
            })?;
            let store = validate_store(&name, raw_store)?;
            stores.insert(slug, store);
        }

        Ok(Config { settings: CortexSettings { default_store, output_format }, stores })
    }

    fn to_raw(&self) -> RawConfig {
        let stores = self
            .stores
            .iter()
            .map(|(name, def)| {
                let raw = RawStore {
                    kind: match def.kind {
                        StoreKind::Filesystem => "filesystem".to_string(),
                    },
                    path: def.path.display().to_string(),
                    description: def.description.clone(),
                    category_mode: match def.category_mode {
                        CategoryMode::Free => "free".to_string(),
                        CategoryMode::Subcategories => "subcategories".to_string(),
                        CategoryMode::Strict => "strict".to_string(),
                    },
                    categories: hierarchy_to_raw(&def.categories),
                };
                (name.as_str().to_string(), raw)
            })
            .collect();
        RawConfig {
            settings: RawSettings {
                default_store: self.settings.default_store.as_str().to_string(),
                output_format: match self.settings.output_format {
                    OutputFormat::Yaml => "yaml".to_string(),
                    OutputFormat::Json => "json".to_string(),
                    OutputFormat::Toon => "toon".to_string(),
                },
            },
            stores,
        }
    }
}

fn validate_store(name: &str, raw: RawStore) -> Result<StoreDefinition, ConfigError> {
    let kind = match raw.kind.as_str() {
        "filesystem" => StoreKind::Filesystem,
        other => {
            return Err(ConfigError::Validation {
                store: name.to_string(),
                field: "kind".to_string(),
                message: format!("unknown store kind '{other}'"),
            });
        }
    };

    let path = PathBuf::from(&raw.path);
    if !path.is_absolute() {
        return Err(ConfigError::InvalidStorePath { store: name.to_string(), path: raw.path });
    }

    if let Some(desc) = &raw.description {
        if desc.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ConfigError::Validation {
                store: name.to_string(),
                field: "description".to_string(),
                message: format!("description exceeds {MAX_DESCRIPTION_LEN} characters"),
            });
        }
    }

    let category_mode = match raw.category_mode.as_str() {
        "free" => CategoryMode::Free,
        "subcategories" => CategoryMode::Subcategories,
        "strict" => CategoryMode::Strict,
        other => {
            return Err(ConfigError::Validation {
                store: name.to_string(),
                field: "category_mode".to_string(),
                message: format!("unknown category mode '{other}' (free, subcategories, strict)"),
            });
        }
    };

    let categories = validate_hierarchy(name, "categories", raw.categories)?;

    Ok(StoreDefinition { kind, path, description: raw.description, category_mode, categories })
}

fn validate_hierarchy(
    store: &str,
    field: &str,
    raw: BTreeMap<String, RawCategoryNode>,
) -> Result<CategoryHierarchy, ConfigError> {
    let mut out = CategoryHierarchy::new();
    for (segment, node) in raw {
        let slug = Slug::parse(&segment).map_err(|e| ConfigError::Validation {
            store: store.to_string(),
            field: format!("{field}.{segment}"),
            message: e.to_string(),
        })?;
        if let Some(desc) = &node.description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(ConfigError::Validation {
                    store: store.to_string(),
                    field: format!("{field}.{segment}.description"),
                    message: format!("description exceeds {MAX_DESCRIPTION_LEN} characters"),
                });
            }
        }
        let subcategories = validate_hierarchy(
            store,
            &format!("{field}.{segment}.subcategories"),
            node.subcategories,
        )?;
        out.insert(slug, CategoryNode { description: node.description, subcategories });
    }
    Ok(out)
}

fn hierarchy_to_raw(hierarchy: &CategoryHierarchy) -> BTreeMap<String, RawCategoryNode> {
    hierarchy
        .iter()
        .map(|(segment, node)| {
            (
                segment.as_str().to_string(),
                RawCategoryNode {
                    description: node.description.clone(),
                    subcategories: hierarchy_to_raw(&node.subcategories),
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Config location resolution
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolve the config directory: explicit override > environment-indicated
/// directory > standard user-config directory. The environment value is
/// accepted as a parameter — wrappers read the actual variable.
pub fn resolve_config_dir(explicit: Option<&str>, env_dir: Option<&str>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(expand_tilde(dir));
    }
    if let Some(dir) = env_dir {
        return Some(expand_tilde(dir));
    }
    dirs::config_dir().map(|d| d.join("cortex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
default_store = "default"
output_format = "yaml"

[stores.default]
kind = "filesystem"
path = "/var/lib/cortex/default"
description = "General memory"
category_mode = "subcategories"

[stores.default.categories.project]
description = "Project knowledge"

[stores.default.categories.project.subcategories.notes]
description = "Working notes"

[stores.scratch]
path = "/tmp/cortex-scratch"
"#;

    #[test]
    fn parses_sample_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.settings.default_store.as_str(), "default");
        assert_eq!(config.settings.output_format, OutputFormat::Yaml);
        assert_eq!(config.stores.len(), 2);

        let default = &config.stores[&Slug::parse("default").unwrap()];
        assert_eq!(default.category_mode, CategoryMode::Subcategories);
        let project = &default.categories[&Slug::parse("project").unwrap()];
        assert_eq!(project.description.as_deref(), Some("Project knowledge"));
        assert!(project.subcategories.contains_key(&Slug::parse("notes").unwrap()));

        // Omitted fields take defaults.
        let scratch = &config.stores[&Slug::parse("scratch").unwrap()];
        assert_eq!(scratch.kind, StoreKind::Filesystem);
        assert_eq!(scratch.category_mode, CategoryMode::Free);
        assert!(scratch.categories.is_empty());
    }

    #[test]
    fn round_trips_through_serialization() {
        let config = Config::parse(SAMPLE).unwrap();
        let text = config.to_toml_string();
        let reparsed = Config::parse(&text).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn rejects_relative_store_path() {
        let text = "[stores.bad]\npath = \"relative/path\"\n";
        match Config::parse(text) {
            Err(ConfigError::InvalidStorePath { store, .. }) => assert_eq!(store, "bad"),
            other => panic!("expected InvalidStorePath, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_store_name() {
        let text = "[stores.\"Bad Name\"]\npath = \"/tmp/x\"\n";
        match Config::parse(text) {
            Err(ConfigError::Validation { field, .. }) => assert_eq!(field, "name"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_category_mode() {
        let text = "[stores.s]\npath = \"/tmp/x\"\ncategory_mode = \"anarchic\"\n";
        match Config::parse(text) {
            Err(ConfigError::Validation { store, field, .. }) => {
                assert_eq!(store, "s");
                assert_eq!(field, "category_mode");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_oversized_description() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        let text = format!("[stores.s]\npath = \"/tmp/x\"\ndescription = \"{long}\"\n");
        assert!(matches!(Config::parse(&text), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.settings, CortexSettings::default());
        assert!(config.stores.is_empty());
    }

    #[test]
    fn hierarchy_lookups() {
        let config = Config::parse(SAMPLE).unwrap();
        let h = &config.stores[&Slug::parse("default").unwrap()].categories;
        let seg = |s: &str| Slug::parse(s).unwrap();

        assert!(hierarchy_contains(h, &[seg("project")]));
        assert!(hierarchy_contains(h, &[seg("project"), seg("notes")]));
        assert!(!hierarchy_contains(h, &[seg("project"), seg("other")]));
        assert!(!hierarchy_contains(h, &[seg("missing")]));
        assert!(!hierarchy_contains(h, &[]));
        assert!(hierarchy_has_root(h, &seg("project")));
        assert!(!hierarchy_has_root(h, &seg("notes")));
    }

    #[test]
    fn expand_tilde_passthrough_for_plain_paths() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel/path"), PathBuf::from("rel/path"));
    }

    #[test]
    fn resolve_config_dir_prefers_explicit() {
        let dir = resolve_config_dir(Some("/etc/cortex"), Some("/ignored")).unwrap();
        assert_eq!(dir, PathBuf::from("/etc/cortex"));
        let dir = resolve_config_dir(None, Some("/from-env")).unwrap();
        assert_eq!(dir, PathBuf::from("/from-env"));
    }
}

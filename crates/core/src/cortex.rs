//! Composition root: config → registry → per-store scoped adapter.
//!
//! A `Cortex` owns the immutable merged config and an adapter factory.
//! Production wires in the filesystem factory; tests inject one returning
//! in-memory adapters. The persisted store registry is the `stores` section
//! of the merged config, exposed through [`StoreRegistryStore`].

use crate::config::{
    Config, ConfigError, CortexSettings, StoreDefinition, CONFIG_FILE_NAME,
};
use crate::ops::category::ModeContext;
use crate::path::Slug;
use crate::storage::{
    filesystem_factory, AdapterError, AdapterFactory, StorageAdapter, StoreRegistry,
    StoreRegistryStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("store '{0}' is not configured")]
    StoreNotFound(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open store '{store}'")]
    Adapter {
        store: String,
        #[source]
        source: AdapterError,
    },
}

impl CortexError {
    pub fn code(&self) -> &'static str {
        match self {
            CortexError::StoreNotFound(_) => "STORE_NOT_FOUND",
            CortexError::Config(e) => e.code(),
            CortexError::Adapter { .. } => "STORAGE_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Root client
// ---------------------------------------------------------------------------

pub struct Cortex {
    config: Config,
    factory: AdapterFactory,
}

impl Cortex {
    /// Load the merged config from `config_dir` and wire in the filesystem
    /// adapter factory.
    pub fn from_config(config_dir: &Path) -> Result<Cortex, ConfigError> {
        let config = Config::load(config_dir)?;
        Ok(Cortex { config, factory: filesystem_factory() })
    }

    /// Programmatic construction with an injected adapter factory.
    pub fn new(
        settings: CortexSettings,
        stores: BTreeMap<Slug, StoreDefinition>,
        factory: AdapterFactory,
    ) -> Cortex {
        Cortex { config: Config { settings, stores }, factory }
    }

    pub fn settings(&self) -> &CortexSettings {
        &self.config.settings
    }

    pub fn stores(&self) -> &BTreeMap<Slug, StoreDefinition> {
        &self.config.stores
    }

    /// Resolve a store name (`None` = the configured default store) to its
    /// definition.
    pub fn definition(&self, name: Option<&str>) -> Result<(&Slug, &StoreDefinition), CortexError> {
        let name = name.unwrap_or_else(|| self.config.settings.default_store.as_str());
        self.config
            .stores
            .iter()
            .find(|(slug, _)| slug.as_str() == name)
            .ok_or_else(|| CortexError::StoreNotFound(name.to_string()))
    }

    /// Produce a scoped adapter for a named store.
    pub fn store(&self, name: Option<&str>) -> Result<Arc<dyn StorageAdapter>, CortexError> {
        let (slug, definition) = self.definition(name)?;
        (self.factory)(definition)
            .map_err(|source| CortexError::Adapter { store: slug.to_string(), source })
    }

    /// Category-mode policy for a named store.
    pub fn mode_context(&self, name: Option<&str>) -> Result<ModeContext, CortexError> {
        let (_, definition) = self.definition(name)?;
        Ok(ModeContext {
            mode: definition.category_mode,
            hierarchy: definition.categories.clone(),
        })
    }

    /// Write the default config to `config_dir` if absent. Idempotent:
    /// an existing config is left untouched and returned as-is.
    pub fn initialize(
        config_dir: &Path,
        default_store_path: &Path,
    ) -> Result<Config, ConfigError> {
        match Config::load(config_dir) {
            Ok(config) => return Ok(config),
            Err(ConfigError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut config = Config::default();
        config.stores.insert(
            config.settings.default_store.clone(),
            StoreDefinition::filesystem(default_store_path.to_path_buf()),
        );
        write_config(config_dir, &config)?;
        info!(dir = %config_dir.display(), "Wrote default config");
        Ok(config)
    }
}

fn write_config(config_dir: &Path, config: &Config) -> Result<(), ConfigError> {
    std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Io {
        path: config_dir.to_path_buf(),
        source,
    })?;
    let path = config_dir.join(CONFIG_FILE_NAME);
    std::fs::write(&path, config.to_toml_string())
        .map_err(|source| ConfigError::Io { path, source })
}

// ---------------------------------------------------------------------------
// Stores facet (root adapter): the registry persisted in the merged config
// ---------------------------------------------------------------------------

pub struct ConfigRegistryStore {
    config_dir: PathBuf,
}

impl ConfigRegistryStore {
    pub fn new(config_dir: PathBuf) -> Self {
        ConfigRegistryStore { config_dir }
    }

    fn load_config(&self) -> Result<Config, AdapterError> {
        Config::load(&self.config_dir).map_err(|e| match e {
            ConfigError::NotFound { path } => {
                AdapterError::NotFound(format!("no config at {}", path.display()))
            }
            other => AdapterError::InvalidState(other.to_string()),
        })
    }

    fn store_config(&self, config: &Config) -> Result<(), AdapterError> {
        write_config(&self.config_dir, config)
            .map_err(|e| AdapterError::IoWrite { message: e.to_string(), source: None })
    }
}

impl StoreRegistryStore for ConfigRegistryStore {
    fn load_registry(&self) -> Result<StoreRegistry, AdapterError> {
        Ok(self.load_config()?.stores)
    }

    /// Replace the registry, preserving settings.
    fn save_registry(&self, registry: &StoreRegistry) -> Result<(), AdapterError> {
        let mut config = match self.load_config() {
            Ok(c) => c,
            Err(AdapterError::NotFound(_)) => Config::default(),
            Err(e) => return Err(e),
        };
        config.stores = registry.clone();
        self.store_config(&config)
    }

    /// Clear the registry, preserving settings.
    fn remove_registry(&self) -> Result<(), AdapterError> {
        let mut config = self.load_config()?;
        config.stores.clear();
        self.store_config(&config)
    }
}

//! CLI subcommands `init` and `doctor`.
//!
//! `init` writes the default config (idempotently), registers the default
//! store, and scaffolds its on-disk layout. `doctor` diagnoses setup
//! issues: config validity, store reachability, and index presence.

use cortex_core::estimate::default_estimator;
use cortex_core::storage::fs::FsAdapter;
use cortex_core::storage::{CategoryStore, IndexStore};
use cortex_core::{CategoryPath, Config, ConfigError, Cortex, StoreDefinition};
use std::path::{Path, PathBuf};

/// Default store location when `init` is not given one explicitly.
fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cortex")
        .join("default")
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

pub fn run_init(config_dir: &Path, store_path: Option<PathBuf>) -> i32 {
    let store_path = store_path.unwrap_or_else(default_store_path);
    let store_path = match store_path.is_absolute() {
        true => store_path,
        false => match std::env::current_dir() {
            Ok(cwd) => cwd.join(store_path),
            Err(e) => {
                eprintln!("Error: could not resolve store path: {e}");
                return 1;
            }
        },
    };

    let config = match Cortex::initialize(config_dir, &store_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return 5;
        }
    };

    // Scaffold every configured filesystem store that is missing its layout.
    for (name, def) in &config.stores {
        let adapter = FsAdapter::new(def.path.clone(), default_estimator());
        match adapter.ensure_category(&CategoryPath::root()) {
            Ok(()) => println!("  store '{}' at {}", name, def.path.display()),
            Err(e) => {
                eprintln!("Error: could not scaffold store '{name}': {e}");
                return 4;
            }
        }
    }

    println!("Initialized Cortex config at {}", config_dir.display());
    println!("  default store: {}", config.settings.default_store);
    println!();
    println!("Next steps:");
    println!("  cortex category create <path>   create a category");
    println!("  cortex create <path>            create a memory");
    println!("  cortex-server --mcp             serve over MCP stdio");
    0
}

// ---------------------------------------------------------------------------
// doctor
// ---------------------------------------------------------------------------

pub fn run_doctor(config_dir: &Path) -> i32 {
    println!("Cortex doctor");
    println!("  config dir: {}", config_dir.display());

    let config = match Config::load(config_dir) {
        Ok(c) => {
            println!("  [ok] config parses ({} stores)", c.stores.len());
            c
        }
        Err(ConfigError::NotFound { path }) => {
            println!("  [fail] no config at {}", path.display());
            println!();
            println!("Run: cortex-server init");
            return 5;
        }
        Err(e) => {
            println!("  [fail] config invalid: {e}");
            return 5;
        }
    };

    if !config.stores.contains_key(&config.settings.default_store) {
        println!(
            "  [warn] default store '{}' is not in the registry",
            config.settings.default_store
        );
    }

    let mut failures = 0;
    for (name, def) in &config.stores {
        match check_store(name.as_str(), def) {
            Ok(summary) => println!("  [ok] {summary}"),
            Err(problem) => {
                println!("  [fail] {problem}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        println!();
        println!("{failures} store(s) need attention. A missing layout can be");
        println!("scaffolded with 'cortex-server init'; stale indexes are repaired");
        println!("with 'cortex reindex'.");
        return 1;
    }
    println!("  all good");
    0
}

fn check_store(name: &str, def: &StoreDefinition) -> Result<String, String> {
    if !def.path.is_dir() {
        return Err(format!("store '{name}': missing directory {}", def.path.display()));
    }
    let adapter = FsAdapter::new(def.path.clone(), default_estimator());
    match adapter.load_index(&CategoryPath::root()) {
        Ok(Some(root)) => Ok(format!(
            "store '{name}': {} root categories at {}",
            root.subcategories.len(),
            def.path.display()
        )),
        Ok(None) => Err(format!(
            "store '{name}': no root index at {} (run init or reindex)",
            def.path.display()
        )),
        Err(e) => Err(format!("store '{name}': unreadable root index: {e}")),
    }
}

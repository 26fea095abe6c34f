//! Cortex CLI — agent memory management from the terminal.
//!
//! Calls `cortex-core` directly with no server overhead.

mod output;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use cortex_core::config::{resolve_config_dir, CategoryMode};
use cortex_core::cortex::ConfigRegistryStore;
use cortex_core::estimate::default_estimator;
use cortex_core::ops::memory::{
    CreateMemoryInput, GetOptions, ListOptions, PruneOptions, RecentOptions, UpdateMemoryInput,
};
use cortex_core::ops::{category as category_ops, memory as memory_ops, Patch};
use cortex_core::storage::fs::FsAdapter;
use cortex_core::storage::{CategoryStore, IndexStore, StoreRegistryStore};
use cortex_core::{CategoryPath, Config, ConfigError, Cortex, OutputFormat, Slug, StoreDefinition};

/// Cortex CLI — persistent agent memory from the terminal.
#[derive(Parser)]
#[command(name = "cortex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory (default: CORTEX_CONFIG_DIR or the user config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Store to operate on (default: CORTEX_DEFAULT_STORE or the configured default)
    #[arg(long, global = true)]
    store: Option<String>,

    /// Output format (default: the configured output_format)
    #[arg(long, global = true, value_enum)]
    output: Option<OutputArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputArg {
    Yaml,
    Json,
    Toon,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Yaml => OutputFormat::Yaml,
            OutputArg::Json => OutputFormat::Json,
            OutputArg::Toon => OutputFormat::Toon,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Free,
    Subcategories,
    Strict,
}

impl From<ModeArg> for CategoryMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Free => CategoryMode::Free,
            ModeArg::Subcategories => CategoryMode::Subcategories,
            ModeArg::Strict => CategoryMode::Strict,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Cortex config and scaffold the default store
    Init {
        /// Default store location (default: ~/.local/share/cortex/default)
        path: Option<PathBuf>,
    },
    /// Create a memory (the parent category must exist)
    Create {
        /// Memory path, e.g. project/notes/alpha
        path: String,

        /// Markdown content (default: empty)
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,

        /// Read content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Citation (repeatable)
        #[arg(long = "cite")]
        citations: Vec<String>,

        /// Expiry timestamp (RFC 3339)
        #[arg(long)]
        expires_at: Option<String>,

        /// Origin label
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Read a memory
    Get {
        /// Memory path
        path: String,

        /// Return the memory even if expired
        #[arg(long)]
        include_expired: bool,
    },
    /// Update a memory (at least one field required)
    Update {
        /// Memory path
        path: String,

        /// Replacement markdown content
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,

        /// Read replacement content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Replacement tag list (repeatable; replaces all tags)
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,

        /// Replacement citation list (repeatable; replaces all citations)
        #[arg(long = "cite")]
        citations: Option<Vec<String>>,

        /// Set the expiry timestamp (RFC 3339)
        #[arg(long, conflicts_with = "clear_expires")]
        expires_at: Option<String>,

        /// Clear the expiry timestamp
        #[arg(long)]
        clear_expires: bool,
    },
    /// Move a memory to a new path
    Move {
        /// Current memory path
        from: String,
        /// New memory path
        to: String,
    },
    /// Delete a memory
    Remove {
        /// Memory path
        path: String,
    },
    /// List memories and subcategories
    List {
        /// Category to list (default: all root categories)
        category: Option<String>,

        /// Include expired memories, flagged
        #[arg(long)]
        include_expired: bool,
    },
    /// Remove expired memories
    Prune {
        /// Scope category (default: the whole store)
        category: Option<String>,

        /// Report what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the most recently updated memories
    Recent {
        /// Scope category (default: all root categories)
        category: Option<String>,

        /// Maximum number of memories
        #[arg(long, default_value = "5")]
        limit: usize,

        /// Include expired memories
        #[arg(long)]
        include_expired: bool,
    },
    /// Rebuild category indexes from the memory files
    Reindex {
        /// Scope category (default: the whole store)
        category: Option<String>,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Manage the store registry
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Check the setup and diagnose issues
    Doctor,
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Create a category (and missing ancestors)
    Create {
        /// Category path, e.g. project/notes
        path: String,
    },
    /// Recursively delete a category with all its contents
    Delete {
        /// Category path
        path: String,
    },
    /// Set or clear a category's description
    Describe {
        /// Category path
        path: String,

        /// Description text (max 500 characters)
        #[arg(long, conflicts_with = "clear")]
        description: Option<String>,

        /// Clear the description
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Register a new store
    Add {
        /// Store name (lowercase slug)
        name: String,

        /// Absolute path of the store root
        path: PathBuf,

        /// Store description
        #[arg(long)]
        description: Option<String>,

        /// Category mode
        #[arg(long, value_enum, default_value = "free")]
        mode: ModeArg,
    },
    /// List registered stores
    List,
    /// Remove a store from the registry (files are left on disk)
    Remove {
        /// Store name
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Error reporting and exit codes
// ---------------------------------------------------------------------------

/// Exit-code families: invalid argument 2, not found 3, storage 4, config 5.
fn exit_code(code: &str) -> i32 {
    match code {
        "INVALID_PATH" | "INVALID_INPUT" | "ROOT_CATEGORY_NOT_ALLOWED" | "CATEGORY_PROTECTED"
        | "CATEGORY_MODE_VIOLATION" => 2,
        "MEMORY_NOT_FOUND" | "CATEGORY_NOT_FOUND" | "STORE_NOT_FOUND" | "DESTINATION_EXISTS"
        | "MEMORY_EXPIRED" => 3,
        "STORAGE_ERROR" | "NOT_FOUND" | "ALREADY_EXISTS" | "IO_READ" | "IO_WRITE"
        | "INDEX_ERROR" | "INVALID_STATE" => 4,
        "CONFIG_NOT_FOUND" | "CONFIG_PARSE_FAILED" | "CONFIG_VALIDATION_FAILED"
        | "INVALID_STORE_PATH" => 5,
        _ => 1,
    }
}

fn fail(code: &str, err: &dyn std::error::Error) -> i32 {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        message.push_str(&format!(": {e}"));
        cause = e.source();
    }
    eprintln!("error[{code}]: {message}");
    exit_code(code)
}

fn fail_message(code: &str, message: &str) -> i32 {
    eprintln!("error[{code}]: {message}");
    exit_code(code)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cortex=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let env_dir = std::env::var("CORTEX_CONFIG_DIR").ok();
    let Some(config_dir) =
        resolve_config_dir(cli.config_dir.as_deref().and_then(|p| p.to_str()), env_dir.as_deref())
    else {
        return fail_message(
            "CONFIG_NOT_FOUND",
            "could not determine a config directory; use --config-dir",
        );
    };

    // Commands that work on the config itself, before a Cortex exists.
    match &cli.command {
        Commands::Init { path } => return run_init(&config_dir, path.clone()),
        Commands::Doctor => return run_doctor(&config_dir),
        Commands::Store { command } => return run_store(&config_dir, command),
        _ => {}
    }

    let cortex = match Cortex::from_config(&config_dir) {
        Ok(c) => c,
        Err(e) => {
            let hint = matches!(e, ConfigError::NotFound { .. });
            let status = fail(e.code(), &e);
            if hint {
                eprintln!("  Run 'cortex init' to create a default config.");
            }
            return status;
        }
    };

    let store = cli.store.clone().or_else(|| std::env::var("CORTEX_DEFAULT_STORE").ok());
    let store = store.as_deref();
    let format = cli.output.map(OutputFormat::from).unwrap_or(cortex.settings().output_format);

    let adapter = match cortex.store(store) {
        Ok(a) => a,
        Err(e) => return fail(e.code(), &e),
    };

    match cli.command {
        Commands::Create { path, content, file, tags, citations, expires_at, source } => {
            let content = match read_content(content, file) {
                Ok(c) => c,
                Err(status) => return status,
            };
            let expires_at = match expires_at.as_deref().map(parse_timestamp).transpose() {
                Ok(v) => v,
                Err(status) => return status,
            };
            let input = CreateMemoryInput { content, source, tags, citations, expires_at };
            match memory_ops::create(adapter.as_ref(), &path, input, None) {
                Ok(memory) => {
                    print!("{}", output::render(&memory, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Get { path, include_expired } => {
            let options = GetOptions { include_expired, now: None };
            match memory_ops::get(adapter.as_ref(), &path, options) {
                Ok(memory) => {
                    print!("{}", output::render(&memory, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Update { path, content, file, tags, citations, expires_at, clear_expires } => {
            let content = match (content, file) {
                (None, None) => None,
                (c, f) => match read_content(c, f) {
                    Ok(text) => Some(text),
                    Err(status) => return status,
                },
            };
            let expires_at = if clear_expires {
                Patch::Clear
            } else {
                match expires_at.as_deref().map(parse_timestamp).transpose() {
                    Ok(Some(at)) => Patch::Set(at),
                    Ok(None) => Patch::Keep,
                    Err(status) => return status,
                }
            };
            let updates = UpdateMemoryInput { content, tags, citations, expires_at };
            match memory_ops::update(adapter.as_ref(), &path, updates, None) {
                Ok(memory) => {
                    print!("{}", output::render(&memory, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Move { from, to } => match memory_ops::relocate(adapter.as_ref(), &from, &to) {
            Ok(dest) => {
                println!("moved {from} -> {dest}");
                0
            }
            Err(e) => fail(e.code(), &e),
        },
        Commands::Remove { path } => match memory_ops::remove(adapter.as_ref(), &path) {
            Ok(removed) => {
                println!("removed {removed}");
                0
            }
            Err(e) => fail(e.code(), &e),
        },
        Commands::List { category, include_expired } => {
            let options = ListOptions { category, include_expired, now: None };
            match memory_ops::list(adapter.as_ref(), options) {
                Ok(result) => {
                    print!("{}", output::render(&result, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Prune { category, dry_run } => {
            let options = PruneOptions { dry_run, now: None };
            match memory_ops::prune(adapter.as_ref(), category.as_deref(), options) {
                Ok(result) => {
                    print!("{}", output::render(&result, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Recent { category, limit, include_expired } => {
            let options = RecentOptions { category, limit, include_expired, now: None };
            match memory_ops::recent(adapter.as_ref(), options) {
                Ok(result) => {
                    print!("{}", output::render(&result, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Reindex { category } => {
            match memory_ops::reindex(adapter.as_ref(), category.as_deref()) {
                Ok(report) => {
                    print!("{}", output::render(&report, format));
                    0
                }
                Err(e) => fail(e.code(), &e),
            }
        }
        Commands::Category { command } => {
            let mode = match cortex.mode_context(store) {
                Ok(m) => m,
                Err(e) => return fail(e.code(), &e),
            };
            match command {
                CategoryCommands::Create { path } => {
                    match category_ops::create_category(adapter.as_ref(), &path, &mode) {
                        Ok(result) => {
                            if result.created {
                                println!("created {}", result.path);
                            } else {
                                println!("exists {}", result.path);
                            }
                            0
                        }
                        Err(e) => fail(e.code(), &e),
                    }
                }
                CategoryCommands::Delete { path } => {
                    match category_ops::delete_category(adapter.as_ref(), &path, &mode) {
                        Ok(deleted) => {
                            println!("deleted {deleted}");
                            0
                        }
                        Err(e) => fail(e.code(), &e),
                    }
                }
                CategoryCommands::Describe { path, description, clear } => {
                    if description.is_none() && !clear {
                        return fail_message(
                            "INVALID_INPUT",
                            "provide --description <text> or --clear",
                        );
                    }
                    let description = if clear { None } else { description };
                    match category_ops::set_category_description(
                        adapter.as_ref(),
                        &path,
                        description.as_deref(),
                    ) {
                        Ok(p) => {
                            println!("described {p}");
                            0
                        }
                        Err(e) => fail(e.code(), &e),
                    }
                }
            }
        }
        // Handled before the Cortex was built.
        Commands::Init { .. } | Commands::Doctor | Commands::Store { .. } => unreachable!(),
    }
}

fn read_content(content: Option<String>, file: Option<PathBuf>) -> Result<String, i32> {
    match (content, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
            fail_message("INVALID_INPUT", &format!("could not read {}: {e}", path.display()))
        }),
        (None, None) => Ok(String::new()),
        (Some(_), Some(_)) => unreachable!("clap conflicts_with prevents this"),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, i32> {
    s.parse().map_err(|e| {
        fail_message("INVALID_INPUT", &format!("'{s}' is not an RFC 3339 timestamp: {e}"))
    })
}

// ---------------------------------------------------------------------------
// init / doctor
// ---------------------------------------------------------------------------

fn run_init(config_dir: &std::path::Path, store_path: Option<PathBuf>) -> i32 {
    let store_path = store_path.unwrap_or_else(|| {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cortex")
            .join("default")
    });
    let store_path = if store_path.is_absolute() {
        store_path
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(store_path),
            Err(e) => return fail_message("INVALID_INPUT", &format!("cannot resolve path: {e}")),
        }
    };

    let config = match Cortex::initialize(config_dir, &store_path) {
        Ok(c) => c,
        Err(e) => return fail(e.code(), &e),
    };

    for (name, def) in &config.stores {
        let adapter = FsAdapter::new(def.path.clone(), default_estimator());
        if let Err(e) = adapter.ensure_category(&CategoryPath::root()) {
            return fail(e.code(), &e);
        }
        println!("store '{}' ready at {}", name, def.path.display());
    }
    println!("config at {}", config_dir.display());
    0
}

fn run_doctor(config_dir: &std::path::Path) -> i32 {
    println!("config dir: {}", config_dir.display());
    let config = match Config::load(config_dir) {
        Ok(c) => c,
        Err(e) => {
            let status = fail(e.code(), &e);
            eprintln!("  Run 'cortex init' to create a default config.");
            return status;
        }
    };
    println!("[ok] config parses ({} stores)", config.stores.len());

    let mut failures = 0;
    for (name, def) in &config.stores {
        let adapter = FsAdapter::new(def.path.clone(), default_estimator());
        match adapter.load_index(&CategoryPath::root()) {
            Ok(Some(root)) => println!(
                "[ok] store '{}': {} root categories at {}",
                name,
                root.subcategories.len(),
                def.path.display()
            ),
            Ok(None) => {
                println!(
                    "[fail] store '{}': no root index at {} (run init or reindex)",
                    name,
                    def.path.display()
                );
                failures += 1;
            }
            Err(e) => {
                println!("[fail] store '{name}': {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        1
    } else {
        println!("all good");
        0
    }
}

// ---------------------------------------------------------------------------
// store registry management
// ---------------------------------------------------------------------------

fn run_store(config_dir: &std::path::Path, command: &StoreCommands) -> i32 {
    let registry_store = ConfigRegistryStore::new(config_dir.to_path_buf());

    match command {
        StoreCommands::Add { name, path, description, mode } => {
            let slug = match Slug::parse(name) {
                Ok(s) => s,
                Err(e) => return fail(e.code(), &e),
            };
            if !path.is_absolute() {
                return fail_message(
                    "INVALID_STORE_PATH",
                    &format!("store path must be absolute: {}", path.display()),
                );
            }

            let mut registry = match registry_store.load_registry() {
                Ok(r) => r,
                Err(e) => {
                    let status = fail(e.code(), &e);
                    eprintln!("  Run 'cortex init' first.");
                    return status;
                }
            };
            if registry.contains_key(&slug) {
                return fail_message("INVALID_INPUT", &format!("store '{name}' already exists"));
            }

            let mut definition = StoreDefinition::filesystem(path.clone());
            definition.description = description.clone();
            definition.category_mode = (*mode).into();
            registry.insert(slug, definition);
            if let Err(e) = registry_store.save_registry(&registry) {
                return fail(e.code(), &e);
            }

            // Scaffold the new store so it is immediately usable.
            let adapter = FsAdapter::new(path.clone(), default_estimator());
            if let Err(e) = adapter.ensure_category(&CategoryPath::root()) {
                return fail(e.code(), &e);
            }
            println!("added store '{}' at {}", name, path.display());
            0
        }
        StoreCommands::List => {
            let config = match Config::load(config_dir) {
                Ok(c) => c,
                Err(e) => return fail(e.code(), &e),
            };
            for (name, def) in &config.stores {
                let marker = if *name == config.settings.default_store { " (default)" } else { "" };
                println!("{}{}  {}", name, marker, def.path.display());
            }
            0
        }
        StoreCommands::Remove { name } => {
            let slug = match Slug::parse(name) {
                Ok(s) => s,
                Err(e) => return fail(e.code(), &e),
            };
            let mut registry = match registry_store.load_registry() {
                Ok(r) => r,
                Err(e) => return fail(e.code(), &e),
            };
            if registry.remove(&slug).is_none() {
                return fail_message(
                    "STORE_NOT_FOUND",
                    &format!("store '{name}' is not registered"),
                );
            }
            if let Err(e) = registry_store.save_registry(&registry) {
                return fail(e.code(), &e);
            }
            println!("removed store '{name}' from the registry (files left on disk)");
            0
        }
    }
}

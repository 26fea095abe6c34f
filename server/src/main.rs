//! Cortex server binary — thin CLI shell over the [`cortex_server`] library crate.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::{CommandFactory, Parser, Subcommand};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cortex_core::config::resolve_config_dir;
use cortex_core::Cortex;
use cortex_server::mcp::run_mcp;
use cortex_server::types::{McpAppContext, McpConfig, McpSession, ServerState};

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Cortex daemon — persistent agent memory over MCP (stdio and HTTP).
#[derive(Parser)]
#[command(name = "cortex-server", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory (default: CORTEX_CONFIG_DIR or the user config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Run as MCP stdio server (for agent clients)
    #[arg(long)]
    mcp: bool,

    /// Comma-separated allowed Origin headers for the MCP HTTP transport
    #[arg(long)]
    allowed_origins: Option<String>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Cortex config and scaffold the default store
    Init {
        /// Default store location (default: ~/.local/share/cortex/default)
        path: Option<PathBuf>,
    },
    /// Check the setup and diagnose issues
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Graceful shutdown signal
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

// ---------------------------------------------------------------------------
// Health endpoint
// ---------------------------------------------------------------------------

async fn api_health(State(ctx): State<McpAppContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "stores": ctx.state.cortex.stores().len(),
        "sessions": ctx.sessions.len(),
    }))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cortex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Resolve the config directory: flag > env > user config dir
    let env_dir = std::env::var("CORTEX_CONFIG_DIR").ok();
    let config_dir = resolve_config_dir(
        cli.config_dir.as_deref().and_then(|p| p.to_str()),
        env_dir.as_deref(),
    )
    .unwrap_or_else(|| {
        error!("Could not determine a config directory. Use --config-dir <path>");
        std::process::exit(5);
    });

    // Handle subcommands
    if let Some(command) = &cli.command {
        match command {
            Commands::Init { path } => {
                std::process::exit(cortex_server::init::run_init(&config_dir, path.clone()));
            }
            Commands::Doctor => {
                std::process::exit(cortex_server::init::run_doctor(&config_dir));
            }
            Commands::Completions { shell } => {
                clap_complete::generate(
                    *shell,
                    &mut Cli::command(),
                    "cortex-server",
                    &mut std::io::stdout(),
                );
                return;
            }
        }
    }

    // Load the composition root
    let cortex = match Cortex::from_config(&config_dir) {
        Ok(c) => c,
        Err(e) => {
            error!(config_dir = %config_dir.display(), error = %e, "Could not load config");
            eprintln!("  Run 'cortex-server init' to create a default config.");
            std::process::exit(5);
        }
    };
    info!(
        stores = cortex.stores().len(),
        default = cortex.settings().default_store.as_str(),
        "Loaded config"
    );

    let state = Arc::new(ServerState { cortex });

    if cli.mcp {
        run_mcp(state);
        return;
    }

    // ---------------------------------------------------------------------------
    // HTTP mode — MCP streamable transport plus health endpoint
    // ---------------------------------------------------------------------------

    // Bind address: 127.0.0.1 by default (MCP spec), --bind-all for 0.0.0.0
    let bind_addr = if cli.bind_all { "0.0.0.0" } else { "127.0.0.1" };

    let explicit_port: Option<u16> = std::env::var("PORT").ok().and_then(|p| p.parse().ok());

    let listener = if let Some(port) = explicit_port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|e| {
            error!(port = port, error = %e, "Could not bind to port");
            eprintln!("  PORT={port} was set explicitly. Choose a different port.");
            std::process::exit(1);
        })
    } else {
        // Auto-scan: try 8732..=8741
        const BASE: u16 = 8732;
        const RANGE: u16 = 10;
        let mut found = None;
        for port in BASE..BASE + RANGE {
            match tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
                Ok(l) => {
                    found = Some(l);
                    break;
                }
                Err(_) => continue,
            }
        }
        found.unwrap_or_else(|| {
            error!(range_start = BASE, range_end = BASE + RANGE - 1, "No free port found");
            eprintln!("  Try: PORT=<port> cortex-server");
            std::process::exit(1);
        })
    };

    let port = listener.local_addr().unwrap().port();

    let cli_allowed_origins: Option<Vec<String>> =
        cli.allowed_origins.map(|s| s.split(',').map(|o| o.trim().to_string()).collect());

    let allowed_origins = cli_allowed_origins.unwrap_or_else(|| {
        vec![
            format!("http://localhost:{port}"),
            format!("http://127.0.0.1:{port}"),
            "http://localhost".to_string(),
            "http://127.0.0.1".to_string(),
            "null".to_string(),
        ]
    });

    let sessions: Arc<DashMap<String, McpSession>> = Arc::new(DashMap::new());
    let ctx = McpAppContext {
        state,
        sessions: sessions.clone(),
        config: Arc::new(McpConfig { allowed_origins }),
    };

    let app = Router::new()
        .route("/health", get(api_health))
        .route(
            "/mcp",
            post(cortex_server::mcp_http::handle_mcp_post)
                .delete(cortex_server::mcp_http::handle_mcp_delete)
                .get(cortex_server::mcp_http::handle_mcp_get),
        )
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            cortex_server::mcp_http::validate_origin,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    // Session cleanup: prune idle sessions every 5 minutes
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let cutoff = std::time::Instant::now() - std::time::Duration::from_secs(1800);
            let before = sessions.len();
            sessions.retain(|_, session| session.last_activity > cutoff);
            let pruned = before - sessions.len();
            if pruned > 0 {
                debug!(pruned = pruned, remaining = sessions.len(), "Pruned idle MCP sessions");
            }
        }
    });

    info!("MCP HTTP transport at /mcp");
    info!(port = port, "http://localhost:{port}");
    // Machine-readable line for scripts (not through tracing)
    eprintln!("CORTEX_PORT={port}");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}

//! mcp-session-server: Model Context Protocol server over stdio or SSE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mcp_session_server::config::{self, Config, TransportMode};
use mcp_session_server::error::ServerError;
use mcp_session_server::mcp::{Dispatcher, McpServer};
use mcp_session_server::session::{SessionDriver, SessionManager};
use mcp_session_server::sse::{self, SseState, StreamSettings};
use mcp_session_server::{build_dispatcher, logging};

/// Model Context Protocol server exposing tools over stdio or HTTP/SSE.
#[derive(Parser, Debug)]
#[command(name = "mcp-session-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve, overriding the configuration
    #[arg(short, long, value_enum)]
    transport: Option<TransportMode>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Serves newline-delimited JSON-RPC on stdin/stdout.
fn run_stdio(dispatcher: Dispatcher) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut server = McpServer::new(dispatcher);
    runtime.block_on(server.run())?;
    Ok(())
}

/// Serves the HTTP/SSE transport until a shutdown signal arrives.
fn run_sse(cfg: &Config, dispatcher: Dispatcher) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let driver = SessionDriver::from_config(&cfg.session).await?;
        info!(driver = ?cfg.session.driver, ttl_secs = cfg.session.ttl_secs, "session store ready");

        let sessions = SessionManager::new(Arc::new(driver));
        let state = SseState::new(
            dispatcher,
            sessions,
            StreamSettings::from_config(&cfg.sse),
        );
        sse::serve(&cfg.sse, state, sse::shutdown_signal()).await
    })
}

/// Entry point for the mcp-session-server binary.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(mode) = args.transport {
        cfg.transport.mode = mode;
    }

    // Initialise logging
    let log_level = logging::log_level(args.verbose, args.quiet, &cfg.logging.level);
    logging::init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cfg.transport.mode,
        "Starting mcp-session-server"
    );

    let dispatcher = build_dispatcher(&cfg);

    let result = match cfg.transport.mode {
        TransportMode::Stdio => run_stdio(dispatcher),
        TransportMode::Sse => run_sse(&cfg, dispatcher),
    };

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

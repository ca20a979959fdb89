//! chhart-mcp: MCP server that turns diagram outlines into chhart.app links
//!
//! Runs one transport binding (stdio by default) until the client goes away
//! or the process is signalled.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use chhart_mcp::chart::LinkBuilder;
use chhart_mcp::config::{self, ServerConfig, SessionMode, PORT_ENV};
use chhart_mcp::error::ConfigError;
use chhart_mcp::mcp::ServerFactory;
use chhart_mcp::transport::{self, HttpSettings, TransportKind};

/// MCP server that turns flowchart and Sankey outlines into shareable
/// chhart.app links.
#[derive(Parser, Debug)]
#[command(name = "chhart-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve
    #[arg(short, long, value_enum, default_value_t = TransportKind::Stdio)]
    transport: TransportKind,

    /// HTTP listen port (overrides the PORT environment variable)
    #[arg(short, long)]
    port: Option<u16>,

    /// Track streamable HTTP clients with session ids
    #[arg(long)]
    stateful: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. Logs go to stderr; stdout belongs to
/// the stdio transport.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the HTTP listen port. Stdio never binds, so `PORT` is not read for it.
fn listen_port(
    args: &Args,
    env_port: Option<&str>,
    server: &ServerConfig,
) -> Result<u16, ConfigError> {
    match args.transport {
        TransportKind::Stdio => Ok(server.port),
        TransportKind::Sse | TransportKind::Streamable => {
            config::resolve_port(args.port, env_port, server)
        }
    }
}

/// Entry point for the chhart-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig was read from: {}", default_path.display());
                    eprintln!("See config/example-config.json for the format");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    let env_port = std::env::var(PORT_ENV).ok();
    let port = match listen_port(&args, env_port.as_deref(), &cfg.server) {
        Ok(port) => port,
        Err(e) => {
            error!(error = %e, "Invalid port");
            return ExitCode::FAILURE;
        }
    };

    let session_mode = if args.stateful {
        SessionMode::Stateful
    } else {
        cfg.server.session_mode
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = %args.transport,
        base_url = %cfg.base_url,
        "Starting chhart-mcp server"
    );

    let factory = ServerFactory::new(LinkBuilder::new(&cfg.base_url));
    let settings = HttpSettings {
        host: cfg.server.host,
        port,
        heartbeat: Duration::from_secs(cfg.server.heartbeat_interval_secs),
        session_mode,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(transport::run(args.transport, factory, settings)) {
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

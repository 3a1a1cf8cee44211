//! # Milvus MCP gateway CLI (`milvus-mcp`)
//!
//! ## Usage
//!
//! ```bash
//! milvus-mcp [--config gateway.toml] [--milvus-uri URI] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `milvus-mcp serve` | Run the MCP server (stdio or HTTP) |
//! | `milvus-mcp tools` | Print the operation catalogue |
//! | `milvus-mcp call <op> --args '<json>'` | Run one operation and print the response |
//! | `milvus-mcp completions <shell>` | Generate shell completions |
//!
//! ## Cursor / Claude Desktop
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "milvus": {
//!       "command": "milvus-mcp",
//!       "args": ["--milvus-uri", "http://localhost:19530", "serve"]
//!     }
//!   }
//! }
//! ```

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use milvus_gateway::config::{self, Backend, Config, Overrides, Transport};
use milvus_gateway::{build_store, dispatch_bounded, logging, server};
use milvus_gateway_core::{Dispatcher, OperationKind};

/// Milvus MCP gateway: vector database operations as MCP tools.
#[derive(Parser)]
#[command(
    name = "milvus-mcp",
    about = "MCP server exposing Milvus vector database operations",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Every key has a default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Milvus server URI.
    #[arg(long, global = true, env = "MILVUS_URI")]
    milvus_uri: Option<String>,

    /// Milvus authentication token (`user:password` or API key).
    #[arg(long, global = true, env = "MILVUS_TOKEN", hide_env_values = true)]
    milvus_token: Option<String>,

    /// Database to operate on.
    #[arg(long, global = true, env = "MILVUS_DB")]
    db_name: Option<String>,

    /// Store backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Log level filter (overridden by `RUST_LOG`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server.
    ///
    /// `stdio` speaks MCP over stdin/stdout; `http` serves streamable-HTTP
    /// MCP at `/mcp` alongside a JSON tool API.
    Serve {
        #[arg(long, value_enum)]
        transport: Option<Transport>,

        /// Listen address for the HTTP transport.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print every operation with its description and parameters.
    Tools {
        /// Emit the catalogue as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run a single operation and print the rendered response.
    ///
    /// Exits with status 1 when the operation fails.
    Call {
        /// Operation name, e.g. `milvus-list-collections`.
        operation: String,

        /// Arguments as a JSON object.
        #[arg(long)]
        args: Option<String>,
    },

    /// Generate shell completions.
    Completions { shell: Shell },
}

fn load(cli: &Cli, transport: Option<Transport>, bind: Option<String>) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    cfg.apply(Overrides {
        milvus_uri: cli.milvus_uri.clone(),
        milvus_token: cli.milvus_token.clone(),
        db_name: cli.db_name.clone(),
        backend: cli.backend,
        transport,
        bind,
        log_level: cli.log_level.clone(),
    });
    cfg.validate()?;
    Ok(cfg)
}

fn parse_args(raw: Option<&str>) -> anyhow::Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("--args must be valid JSON")?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        _ => anyhow::bail!("--args must be a JSON object"),
    }
}

fn print_tools(as_json: bool) -> anyhow::Result<()> {
    let infos: Vec<_> = OperationKind::all().map(OperationKind::info).collect();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    for info in infos {
        let tag = if info.read_only { "read" } else { "write" };
        println!("{} ({})", info.name, tag);
        println!("    {}", info.description);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "milvus-mcp", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Tools { json } => return print_tools(*json),
        _ => {}
    }

    let (transport, bind) = match &cli.command {
        Commands::Serve { transport, bind } => (*transport, bind.clone()),
        _ => (None, None),
    };
    let cfg = load(&cli, transport, bind)?;
    logging::init(&cfg.logging)?;

    let dispatcher = Dispatcher::new(build_store(&cfg)?);
    let request_timeout = Duration::from_secs(cfg.server.request_timeout_secs);

    match &cli.command {
        Commands::Serve { .. } => match cfg.server.transport {
            Transport::Stdio => server::run_stdio(dispatcher, request_timeout).await?,
            Transport::Http => {
                server::run_http(dispatcher, request_timeout, &cfg.server.bind).await?
            }
        },
        Commands::Call { operation, args } => {
            let args = parse_args(args.as_deref())?;
            let rendered = dispatch_bounded(
                &dispatcher,
                operation,
                args,
                request_timeout,
                std::future::pending(),
            )
            .await;
            if rendered.is_error {
                eprintln!("{}", rendered);
                std::process::exit(1);
            }
            println!("{}", rendered);
        }
        Commands::Tools { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use cmdr_serve::config::Config;
use cmdr_serve::llm::{Generator, LlmClient};
use cmdr_serve::orchestrator::Orchestrator;
use cmdr_serve::prompt::{self, Mode};
use cmdr_serve::server::{self, AppState, body::parse_body};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "cmdr-serve",
    version,
    about = "HTTP generation server for Command-R models: chat, tool use and grounded RAG"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to config file
        #[arg(short, long, default_value = "cmdr-serve.toml")]
        config: PathBuf,

        /// Port override
        #[arg(short, long)]
        port: Option<u16>,

        /// Model override (as known to the inference runtime)
        #[arg(short, long)]
        model: Option<String>,

        /// Debug logging
        #[arg(short, long)]
        debug: bool,

        /// Bind address override
        #[arg(long)]
        host: Option<String>,

        /// Inference runtime base URL override
        #[arg(long)]
        backend_url: Option<String>,
    },

    /// Print the prompt a request body renders to (no generation)
    Render {
        /// completion (or generate), chat, tool, rag
        #[arg(long)]
        mode: Mode,

        /// JSON request body, as sent to the matching route
        #[arg(long)]
        request: PathBuf,
    },

    /// Interpret a saved raw completion against a request body (no generation)
    Parse {
        /// completion (or generate), chat, tool, rag
        #[arg(long)]
        mode: Mode,

        /// JSON request body, as sent to the matching route
        #[arg(long)]
        request: PathBuf,

        /// File holding the raw model output
        #[arg(long)]
        completion: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Command::Serve { debug: true, .. });
    let default_filter = if debug {
        "cmdr_serve=debug"
    } else {
        "cmdr_serve=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    dotenvy::dotenv().ok();

    match cli.command {
        Command::Serve {
            config,
            port,
            model,
            debug: _,
            host,
            backend_url,
        } => {
            let mut cfg = Config::load_or_default(&config)?;
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(model) = model {
                cfg.backend.model = model;
            }
            if let Some(url) = backend_url {
                cfg.backend.base_url = Some(url);
            }
            cfg.validate()?;
            serve(cfg).await
        }
        Command::Render { mode, request } => {
            let parsed = parse_body(mode, &read(&request)?)?;
            print!("{}", prompt::render(&parsed.request)?);
            Ok(())
        }
        Command::Parse {
            mode,
            request,
            completion,
        } => {
            let parsed = parse_body(mode, &read(&request)?)?;
            let raw = std::fs::read_to_string(&completion)
                .with_context(|| format!("Failed to read {}", completion.display()))?;
            let result = prompt::parse(&parsed.request, &raw)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let client = LlmClient::from_config(&cfg.backend)?;
    tracing::info!(
        model = client.model(),
        backend = client.base_url(),
        "using inference runtime"
    );

    let orchestrator = Orchestrator::new(Arc::new(client), cfg.sampling.clone());
    let state = AppState::new(
        orchestrator,
        Duration::from_secs(cfg.server.request_timeout_secs),
    )
    .with_max_body_bytes(cfg.server.max_body_bytes);

    server::serve(&cfg.server.bind_addr(), state).await
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

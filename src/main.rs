mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arax_actions::{
    create_registry_with_options, EdgeSupportRanker, InMemoryKnowledgeProvider, KnowledgeProvider,
    Ranker, RegistryOptions,
};
use arax_core::{KnowledgeGraph, Response};
use arax_executor::{
    parse_request, rejected, CallbackClient, Executor, FsStore, FsTracker, InMemoryStore,
    InMemoryTracker, QueryTracker, ResponseStore, Submission,
};
use clap::{Parser, Subcommand};
use config::{AraxConfig, Backend};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arax", version, about = "ARAX processing-plan executor")]
struct Cli {
    /// Config file (default ~/.arax/arax.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Override the response store directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a query request and print the response envelope
    Run {
        /// Request JSON file
        request: PathBuf,

        /// Knowledge graph JSON answering `expand`
        #[arg(long)]
        kg_source: Option<PathBuf>,

        /// Run in the background and wait for completion
        #[arg(long = "async", default_value_t = false)]
        asynchronous: bool,
    },
    /// Check a request's shape without running it
    Validate {
        request: PathBuf,
    },
    /// Print a stored response
    Show {
        id: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = cli.config.clone().unwrap_or_else(AraxConfig::default_path);
    let mut config = AraxConfig::load(&config_path);
    if let Some(dir) = &cli.store_dir {
        config.store.backend = Backend::Fs;
        config.store.dir = dir.clone();
    }

    let ok = match cli.command {
        Command::Run {
            request,
            kg_source,
            asynchronous,
        } => run(&config, &request, kg_source.as_deref(), asynchronous).await?,
        Command::Validate { request } => validate(&request)?,
        Command::Show { id } => show(&config, id).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "arax=info,arax_executor=info,arax_actions=info,arax_resultify=info";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_envelope(response: &Response) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.envelope)?);
    Ok(())
}

fn open_store(config: &AraxConfig) -> Arc<dyn ResponseStore> {
    match config.store.backend {
        Backend::Memory => Arc::new(InMemoryStore::new()),
        Backend::Fs => Arc::new(FsStore::new(&config.store.dir)),
    }
}

fn open_tracker(config: &AraxConfig) -> Arc<dyn QueryTracker> {
    match config.tracker.backend {
        Backend::Memory => Arc::new(InMemoryTracker::new()),
        Backend::Fs => Arc::new(FsTracker::new(&config.tracker.dir)),
    }
}

async fn run(
    config: &AraxConfig,
    request_path: &Path,
    kg_source: Option<&Path>,
    asynchronous: bool,
) -> anyhow::Result<bool> {
    let provider: Arc<dyn KnowledgeProvider> = match kg_source {
        Some(path) => Arc::new(
            InMemoryKnowledgeProvider::from_file("kg-source", path)
                .with_context(|| format!("loading knowledge graph {}", path.display()))?,
        ),
        None => Arc::new(InMemoryKnowledgeProvider::new("empty", KnowledgeGraph::default())),
    };
    let ranker: Arc<dyn Ranker> = Arc::new(EdgeSupportRanker);
    let registry = create_registry_with_options(
        provider,
        ranker.clone(),
        RegistryOptions {
            default_kp_timeout: config.default_kp_timeout(),
        },
    );

    let mut executor = Executor::new(registry, ranker)
        .with_store(open_store(config))
        .with_tracker(open_tracker(config))
        .with_callback_client(CallbackClient::new(config.callback_timeout()));
    if let Some(base_uri) = &config.base_uri {
        executor = executor.with_base_uri(base_uri.clone());
    }

    let mut request = match parse_request(read_json(request_path)?) {
        Ok(request) => request,
        Err(e) => {
            print_envelope(&rejected(&e))?;
            return Ok(false);
        }
    };
    request.asynchronous |= asynchronous;

    let response = match executor.submit(request).await {
        Submission::Completed(response) => response,
        Submission::Running { ack, handle } => {
            eprintln!("{}", ack.description());
            handle
                .wait()
                .await
                .context("background query ended without a response")?
        }
    };
    print_envelope(&response)?;
    Ok(response.is_ok())
}

fn validate(request_path: &Path) -> anyhow::Result<bool> {
    match parse_request(read_json(request_path)?) {
        Ok(request) => {
            let actions = request.actions();
            println!("valid request: {} actions", actions.len());
            for call in &actions {
                println!("  {}", call.command);
            }
            Ok(true)
        }
        Err(e) => {
            println!("invalid request [{}]: {}", e.code(), e);
            Ok(false)
        }
    }
}

async fn show(config: &AraxConfig, id: u64) -> anyhow::Result<bool> {
    if config.store.backend == Backend::Memory {
        anyhow::bail!("the memory store does not persist between runs; configure [store] backend = \"fs\"");
    }
    let store = FsStore::new(&config.store.dir);
    let response = store.get(id).await?;
    print_envelope(&response)?;
    Ok(true)
}

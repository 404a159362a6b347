use clap::{Parser, Subcommand};
use digital_twin_orchestrator::{
    config::OrchestratorConfig,
    embedding::create_embedder,
    ingest::Ingestor,
    models::{IngestRequest, Metadata, Priority, QueryRequest, SourceType},
    store::{ContextStore, DirectoryStore, TextSplitter},
    OrchestrationError, Orchestrator,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Store directory used by the binary when none is configured.
const DEFAULT_STORE_DIR: &str = "vector_store";

/// Digital twin orchestrator
#[derive(Parser, Debug)]
#[command(name = "twin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Context store directory (overrides VECTOR_STORE_DIR)
    #[arg(long, global = true, value_name = "PATH")]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the twin a question
    Query {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "internal")]
        source_type: String,
        #[arg(long)]
        source_id: Option<String>,
        /// high, normal or low
        #[arg(long, default_value = "normal")]
        priority: String,
    },

    /// Archive a payload reference without running agents
    Archive {
        #[arg(long)]
        payload_ref: String,
        #[arg(long, default_value = "internal")]
        source_type: String,
        /// Payload metadata as key=value, repeatable
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Add texts or a directory of documents to the context store
    Ingest {
        #[arg(long, num_args = 1.., conflicts_with = "dir", required_unless_present = "dir")]
        texts: Vec<String>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Similarity search over the context store
    Search {
        #[arg(long)]
        query: String,
        #[arg(short, default_value = "5")]
        k: usize,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn parse_priority(raw: &str) -> Result<Priority, OrchestrationError> {
    serde_json::from_value(Value::String(raw.trim().to_lowercase()))
        .map_err(|_| OrchestrationError::ValidationError(format!("unknown priority '{}'", raw)))
}

async fn open_store(config: &OrchestratorConfig) -> Result<DirectoryStore, OrchestrationError> {
    let dir = config
        .store_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
    let embedder = create_embedder(&config.embedding, config.retrieval_timeout)?;
    DirectoryStore::open(dir, embedder).await
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), OrchestrationError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = OrchestratorConfig::from_env()?;
    if let Some(dir) = cli.store_dir {
        config.store_dir = Some(dir);
    }
    if config.store_dir.is_none() {
        config.store_dir = Some(PathBuf::from(DEFAULT_STORE_DIR));
    }

    match cli.command {
        Command::Query {
            question,
            source_type,
            source_id,
            priority,
        } => {
            let source_type: SourceType = source_type.parse()?;
            let mut request = QueryRequest::question(question, source_type);
            request.source_id = source_id;
            request.priority = parse_priority(&priority)?;
            run(config, request).await?;
        }
        Command::Archive {
            payload_ref,
            source_type,
            meta,
        } => {
            let source_type: SourceType = source_type.parse()?;
            let metadata: Metadata = meta
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            run(config, QueryRequest::payload(payload_ref, source_type, metadata)).await?;
        }
        Command::Ingest { texts, dir } => {
            let store: Arc<dyn ContextStore> = Arc::new(open_store(&config).await?);
            let splitter = TextSplitter::new(config.chunk_window, config.chunk_overlap)?;
            let ingestor = Ingestor::new(store, splitter);

            match dir {
                Some(dir) => {
                    let report = ingestor.ingest_dir(&dir).await?;
                    print_json(&report)?;
                }
                None => {
                    let ids = ingestor
                        .ingest_texts(IngestRequest {
                            texts,
                            metadatas: None,
                        })
                        .await?;
                    print_json(&ids)?;
                }
            }
        }
        Command::Search { query, k } => {
            let store = open_store(&config).await?;
            let hits = store.similarity_search(&query, k, None).await?;
            info!(hits = hits.len(), "Search complete");
            print_json(&hits)?;
        }
    }

    Ok(())
}

async fn run(config: OrchestratorConfig, request: QueryRequest) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::builder(config).build().await?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            on_interrupt.cancel();
        }
    });

    match orchestrator.run_with_cancellation(request, token).await {
        Ok(state) => {
            print_json(&state)?;
            Ok(())
        }
        Err(OrchestrationError::Cancelled { run_id, partial }) => {
            print_json(&partial)?;
            Err(format!("run {} cancelled", run_id).into())
        }
        Err(e) => Err(e.into()),
    }
}

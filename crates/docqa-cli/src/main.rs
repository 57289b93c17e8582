mod config;

use anyhow::bail;
use clap::{Parser, Subcommand};
use config::DocqaConfig;
use docqa_agent::{AnswerComposer, LlmClient, RagService, SessionRegistry};
use docqa_core::DocumentStatus;
use docqa_gateway::{AuthConfig, GatewayServer, Sanitizer};
use docqa_index::{
    build_embedder, Chunker, DirectorySource, DocumentStore, FileChunkStore, HybridRetriever,
    IndexContext, RetrievalOptions, SearchMode,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docqa", about = "Document question answering over a hybrid retrieval index")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "docqa.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chunk, embed and index documents (all not-yet-ready ones if none given)
    Preprocess { names: Vec<String> },
    /// List known documents and their status
    Documents,
    /// Rank passages for a query without generating an answer
    Query {
        text: String,
        #[arg(short, long)]
        num_results: Option<usize>,
        #[arg(long, conflicts_with = "vector_only")]
        lexical_only: bool,
        #[arg(long)]
        vector_only: bool,
    },
}

/// Index-side components shared by every subcommand.
struct IndexRuntime {
    store: Arc<DocumentStore>,
    retriever: HybridRetriever,
}

async fn open_index(config: &DocqaConfig) -> anyhow::Result<IndexRuntime> {
    let embedder = build_embedder(&config.embedding)?;
    let index = Arc::new(IndexContext::new(
        embedder.dimension(),
        config.retrieval.metric,
    ));
    let chunk_store = Arc::new(FileChunkStore::new(config.chunks_dir()).await?);
    let store = Arc::new(
        DocumentStore::new(
            Arc::new(DirectorySource::new(&config.documents.dir)),
            Chunker::new(&config.chunking)?,
            Arc::clone(&embedder),
            Arc::clone(&index),
            chunk_store,
        )
        .with_batch_size(config.embedding.batch_size),
    );

    let restored = store.restore().await?;
    info!(
        documents = restored,
        model = embedder.model_id(),
        dir = %config.documents.dir.display(),
        "Index opened"
    );

    let retriever = HybridRetriever::new(index, embedder, config.retrieval.clone());
    Ok(IndexRuntime { store, retriever })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = DocqaConfig::load(&cli.config).await?;
    let runtime = open_index(&config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let auth = AuthConfig::new(config.security.api_keys.clone());
            if auth.is_enabled() {
                info!(keys = config.security.api_keys.len(), "API key auth enabled");
            }

            let llm = Arc::new(LlmClient::new(config.model)?);
            let service = RagService::new(
                runtime.store,
                runtime.retriever,
                AnswerComposer::new(llm),
                SessionRegistry::new(&config.session),
            );
            let app = GatewayServer::build_with_middleware(
                Arc::new(service),
                auth,
                Sanitizer::new(config.security.max_message_length),
            );

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("docqa listening on {addr}");
            axum::serve(listener, app).await?;
        }
        Commands::Preprocess { names } => {
            let outcomes = runtime.store.preprocess_many(&names).await?;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.error {
                    Some(error) => {
                        failed += 1;
                        println!("{}  {}  {error}", outcome.document_id, outcome.status);
                    }
                    None => println!(
                        "{}  {}  {} chunk(s)",
                        outcome.document_id, outcome.status, outcome.chunk_count
                    ),
                }
            }
            if outcomes.is_empty() {
                println!("Nothing to preprocess.");
            }
            if failed > 0 {
                bail!("{failed} of {} document(s) failed", outcomes.len());
            }
        }
        Commands::Documents => {
            let documents = runtime.store.list().await?;
            if documents.is_empty() {
                println!("No documents in {}", config.documents.dir.display());
            }
            for doc in &documents {
                let detail = match (doc.status, &doc.error) {
                    (DocumentStatus::Failed, Some(error)) => error.clone(),
                    _ => format!("{} chunk(s)", doc.chunk_ids.len()),
                };
                println!("{}  {}  {detail}", doc.id, doc.status);
            }
        }
        Commands::Query {
            text,
            num_results,
            lexical_only,
            vector_only,
        } => {
            let mut options = runtime.retriever.default_options();
            if let Some(n) = num_results {
                options = options.with_num_results(n);
            }
            if lexical_only {
                options = options.with_mode(SearchMode::Lexical);
            } else if vector_only {
                options = options.with_mode(SearchMode::Vector);
            }
            print_ranked(&runtime.retriever, &text, &options).await?;
        }
    }

    Ok(())
}

async fn print_ranked(
    retriever: &HybridRetriever,
    text: &str,
    options: &RetrievalOptions,
) -> anyhow::Result<()> {
    let result = retriever.retrieve(text, options).await?;
    if result.is_empty() {
        println!("No matching passages.");
        return Ok(());
    }
    for (i, chunk) in result.chunks.iter().enumerate() {
        let similarity = chunk
            .similarity
            .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
        println!(
            "[{}] {}  score {:.4}  similarity {similarity}",
            i + 1,
            chunk.chunk_id,
            chunk.score
        );
        println!("    {}", chunk.text.trim().replace('\n', "\n    "));
    }
    Ok(())
}

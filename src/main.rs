use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use pagegist::config::Config;
use pagegist::fetch::HttpFetcher;
use pagegist::pipeline::Pipeline;
use pagegist::providers::{CompletionBackend, OpenAiCompletion, OpenAiEmbeddings};
use pagegist::rag::{EmbeddingStore, Retriever};
use pagegist::server::{self, AppState};
use pagegist::{logging, PipelineError};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    logging::init(config.log_dir.as_deref());

    if let Err(err) = run(Arc::new(config)).await {
        error!(error = %err, "server failed to start");
        std::process::exit(1);
    }
}

async fn run(config: Arc<Config>) -> Result<(), String> {
    let fetcher = Arc::new(
        HttpFetcher::new(config.fetch.timeout, config.fetch.max_bytes)
            .map_err(|e| format!("fetcher init failed: {}", e))?,
    );
    let completion: Arc<dyn CompletionBackend> = Arc::new(OpenAiCompletion::new(&config.provider));

    let retriever = match &config.index_path {
        Some(path) => {
            let store = open_store(path)?;
            let embedder = Arc::new(OpenAiEmbeddings::new(&config.provider));
            info!(path = %path.display(), "embedding index enabled");
            Some(Arc::new(Retriever::new(
                store,
                embedder,
                config.retrieval.clone(),
                config.chunking.retrieval_target,
            )))
        }
        None => {
            info!("no index path configured, retrieval disabled");
            None
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        config.clone(),
        fetcher,
        retriever,
        completion.clone(),
    ));
    let app = server::router(AppState {
        pipeline,
        completion,
    });

    info!(addr = %config.bind_addr, "listening");
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", config.bind_addr, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {}", e))
}

fn open_store(path: &std::path::Path) -> Result<EmbeddingStore, String> {
    EmbeddingStore::open(path).map_err(|err: PipelineError| format!("failed to open embedding store: {}", err))
}

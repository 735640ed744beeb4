use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, resolved once at startup and handed to each
/// component at construction. Nothing below `main` reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP server.
    pub bind_addr: String,
    pub provider: ProviderConfig,
    pub fetch: FetchConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    /// Path of the sled embedding store. `None` disables indexing and
    /// retrieval entirely; summaries then run over raw chunks.
    pub index_path: Option<PathBuf>,
    /// Directory for rolling log files. `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub api_key: String,
    pub completion_model: String,
    pub embedding_model: String,
    /// Ceiling for a single provider round trip.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Hard cap on a fetched body, declared or actual.
    pub max_bytes: usize,
    /// A fetched HTML body shorter than this is considered too thin and is
    /// replaced by the caller's DOM snapshot when one was supplied.
    pub min_content_length: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size for indexing and retrieval.
    pub retrieval_target: usize,
    /// Target chunk size for map-reduce mini-summaries.
    pub map_target: usize,
    /// Combined text above this length goes through map-reduce when no
    /// retrieval index narrowed it first.
    pub direct_input_ceiling: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// How many chunks the retriever keeps.
    pub top_k: usize,
    /// How many of the kept chunks end up in the prompt.
    pub prompt_chunk_cap: usize,
    /// Query used when the caller asked for a plain summary.
    pub default_query: String,
    /// Batch size for embedding calls. A model change on a large document
    /// re-embeds everything, so this bounds individual request sizes.
    pub embed_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8097".to_string(),
            provider: ProviderConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                completion_model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                timeout: Duration::from_secs(60),
            },
            fetch: FetchConfig {
                timeout: Duration::from_millis(12_000),
                max_bytes: 15 * 1024 * 1024,
                min_content_length: 800,
            },
            chunking: ChunkingConfig {
                retrieval_target: 1200,
                map_target: 4000,
                direct_input_ceiling: 12_000,
            },
            retrieval: RetrievalConfig {
                top_k: 8,
                prompt_chunk_cap: 6,
                default_query: "summary".to_string(),
                embed_batch_size: 64,
            },
            index_path: None,
            log_dir: None,
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl Config {
    /// Builds the configuration from `PAGEGIST_*` environment variables,
    /// falling back to defaults field by field.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            bind_addr: env("PAGEGIST_BIND").unwrap_or(defaults.bind_addr),
            provider: ProviderConfig {
                base_url: env("PAGEGIST_PROVIDER_BASE_URL").unwrap_or(defaults.provider.base_url),
                api_key: env("PAGEGIST_API_KEY").unwrap_or(defaults.provider.api_key),
                completion_model: env("PAGEGIST_COMPLETION_MODEL")
                    .unwrap_or(defaults.provider.completion_model),
                embedding_model: env("PAGEGIST_EMBEDDING_MODEL")
                    .unwrap_or(defaults.provider.embedding_model),
                timeout: env_millis("PAGEGIST_PROVIDER_TIMEOUT_MS", defaults.provider.timeout),
            },
            fetch: FetchConfig {
                timeout: env_millis("PAGEGIST_FETCH_TIMEOUT_MS", defaults.fetch.timeout),
                max_bytes: env_usize("PAGEGIST_FETCH_MAX_BYTES", defaults.fetch.max_bytes),
                min_content_length: env_usize(
                    "PAGEGIST_MIN_CONTENT_LENGTH",
                    defaults.fetch.min_content_length,
                ),
            },
            chunking: ChunkingConfig {
                retrieval_target: env_usize(
                    "PAGEGIST_RETRIEVAL_CHUNK",
                    defaults.chunking.retrieval_target,
                ),
                map_target: env_usize("PAGEGIST_MAP_CHUNK", defaults.chunking.map_target),
                direct_input_ceiling: env_usize(
                    "PAGEGIST_DIRECT_INPUT_CEILING",
                    defaults.chunking.direct_input_ceiling,
                ),
            },
            retrieval: RetrievalConfig {
                top_k: env_usize("PAGEGIST_TOP_K", defaults.retrieval.top_k),
                prompt_chunk_cap: env_usize(
                    "PAGEGIST_PROMPT_CHUNK_CAP",
                    defaults.retrieval.prompt_chunk_cap,
                ),
                default_query: env("PAGEGIST_DEFAULT_QUERY").unwrap_or(defaults.retrieval.default_query),
                embed_batch_size: env_usize(
                    "PAGEGIST_EMBED_BATCH",
                    defaults.retrieval.embed_batch_size,
                ),
            },
            index_path: env("PAGEGIST_INDEX_PATH").map(PathBuf::from),
            log_dir: env("PAGEGIST_LOG_DIR").map(PathBuf::from),
        }
    }
}

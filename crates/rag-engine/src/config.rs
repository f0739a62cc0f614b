use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

/// Top-level configuration, loaded from `config/settings.toml` with
/// environment overrides under the `APP` prefix (`APP__RAG__CHUNK_SIZE`,
/// double-underscore separated).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub docs: DocsConfig,
    pub rag: RagConfig,
    pub model: ModelConfig,
    pub budget: BudgetConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// `DOCS_GLOBS` / `DOCS_EXTS` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct DocsConfig {
    pub globs: Vec<String>,
    pub exts: Vec<String>,
}

/// `RAG.*` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct RagConfig {
    pub enabled: bool,
    pub max_file_size_mb: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub candidates_k: usize,
    pub embedder_backend: String,
    pub embed_dim: usize,
    pub rerank_alpha: f32,
    pub prompt_max_chars: usize,
    pub index_dir: PathBuf,
    pub sqlite_file: String,
    pub index_file: String,
    /// Base URL for the remote embedding backend, when `embedder_backend ==
    /// "remote"`.
    pub embed_base_url: Option<String>,
}

/// `MODEL.*` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub backend: String,
    pub model_name: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
    pub stream: bool,
    pub think: bool,
    pub timeout_seconds: u64,
}

/// `BUDGET.*` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    pub model_context_window: usize,
    pub summary_token_limit: usize,
    pub recent_message_limit: usize,
    pub memory_token_limit: usize,
    pub evidence_token_limit: usize,
}

/// On-disk layout for the History Store (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = Config::builder()
            .add_source(Self::defaults()?)
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Baseline values so the engine runs out of the box without a
    /// `config/settings.toml`, consistent with the configuration surface
    /// enumerated in §6.
    fn defaults() -> Result<config::File<config::FileSourceString, config::FileFormat>, config::ConfigError> {
        Ok(config::File::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [docs]
            globs = ["./corpus/**/*"]
            exts = ["txt", "md", "pdf"]

            [rag]
            enabled = true
            max_file_size_mb = 64
            chunk_size = 800
            chunk_overlap = 100
            top_k = 5
            candidates_k = 20
            embedder_backend = "hashing"
            embed_dim = 2048
            rerank_alpha = 0.10
            prompt_max_chars = 6000
            index_dir = "./data/index"
            sqlite_file = "rag.sqlite"
            index_file = "vectors.idx"

            [model]
            backend = "http"
            model_name = "default"
            base_url = "http://127.0.0.1:11434"
            temperature = 0.7
            top_p = 0.9
            max_new_tokens = 512
            stream = true
            think = false
            timeout_seconds = 120

            [budget]
            model_context_window = 8192
            summary_token_limit = 512
            recent_message_limit = 10
            memory_token_limit = 256
            evidence_token_limit = 3000

            [history]
            path = "./data/history.db"
            "#,
            config::FileFormat::Toml,
        ))
    }
}

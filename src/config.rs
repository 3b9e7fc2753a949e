//! TOML configuration for the helpdesk service.
//!
//! Every section is optional; missing sections and keys fall back to the
//! defaults below. [`load_config`] parses and validates in one step.
//!
//! ```toml
//! [corpus]
//! root = "./documentation"
//!
//! [chunking]
//! chunk_size = 500
//! overlap = 50
//!
//! [llm]
//! model = "llama3-8b-8192"
//!
//! [server]
//! bind = "0.0.0.0:5000"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use helpdesk_rag_core::generate::CONTEXT_PLACEHOLDER;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the manuals and FAQs live.
///
/// An explicit `paths` list wins over walking `root`.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            include_globs: default_include_globs(),
            paths: Vec::new(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("documentation")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.csv".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    helpdesk_rag_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    helpdesk_rag_core::chunk::DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// OpenAI-compatible chat completion endpoint (Groq by default).
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures. `0` disables the retry layer.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: 0.0,
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_llm_model() -> String {
    "llama3-8b-8192".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    helpdesk_rag_core::retrieve::DEFAULT_K
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AssistantConfig {
    /// Persona prompt; must contain `{context}`. Built-in persona when unset.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// Maximum live sessions; least recently used are evicted. `0` = unbounded.
    #[serde(default)]
    pub max_sessions: usize,
    /// Idle time after which a session expires. `0` = never.
    #[serde(default)]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            idle_ttl_secs: 0,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionsConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

/// Log levels: a default plus per-target overrides.
///
/// ```toml
/// [logging]
/// default = "info"
///
/// [logging.modules]
/// helpdesk_rag_core = "debug"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    // Embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
            other
        ),
    }

    // LLM
    if config.llm.base_url.trim().is_empty() {
        anyhow::bail!("llm.base_url must not be empty");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Assistant
    if let Some(prompt) = &config.assistant.system_prompt {
        if !prompt.contains(CONTEXT_PLACEHOLDER) {
            anyhow::bail!(
                "assistant.system_prompt must contain the {} placeholder",
                CONTEXT_PLACEHOLDER
            );
        }
    }

    // Sessions
    if config.sessions.sweep_interval_secs == 0 {
        anyhow::bail!("sessions.sweep_interval_secs must be > 0");
    }

    Ok(())
}

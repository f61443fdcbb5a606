use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the ingested corpus is stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Retrieval and generation pipeline tuning
    pub pipeline: PipelineConfig,
    /// Maximum number of live sessions
    pub max_sessions: usize,
    /// Maximum turns processed at once across all sessions
    pub max_concurrent_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for rewriting, expansion and answers
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature for chat completions
    pub temperature: f32,
}

/// Knobs for the rewrite -> multi-query retrieval -> synthesis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of alternative phrasings requested per query
    pub fanout: usize,
    /// Passages returned per retrieval call
    pub top_k: usize,
    /// Per-call retrieval timeout in seconds (1 to 120)
    pub retrieval_timeout_secs: u64,
    /// Per-call generation timeout in seconds (1 to 300)
    pub generation_timeout_secs: u64,
    /// Retrieval calls in flight at once during fan-out
    pub max_concurrent_retrievals: usize,
    /// Most recent display turns carried into synthesis prompts (0 = all)
    pub max_history_turns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            max_sessions: 100,
            max_concurrent_turns: 3,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            temperature: 0.5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            top_k: 5,
            retrieval_timeout_secs: 15,
            generation_timeout_secs: 60,
            max_concurrent_retrievals: 4,
            max_history_turns: 0,
        }
    }
}

impl PipelineConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs.max(1))
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs.max(1))
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DOC_INQUIRY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("DOC_INQUIRY_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_MAX_SESSIONS") {
            if let Ok(v) = val.parse() {
                config.max_sessions = v;
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_MAX_CONCURRENT_TURNS") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_concurrent_turns = v.max(1);
            }
        }

        // LLM config
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                config.llm.temperature = v;
            }
        }

        // Pipeline config
        if let Ok(val) = std::env::var("DOC_INQUIRY_FANOUT") {
            if let Ok(v) = val.parse() {
                config.pipeline.fanout = v;
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_TOP_K") {
            if let Ok(v) = val.parse() {
                config.pipeline.top_k = v;
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_RETRIEVAL_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.pipeline.retrieval_timeout_secs = v.clamp(1, 120);
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_GENERATION_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.pipeline.generation_timeout_secs = v.clamp(1, 300);
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_MAX_CONCURRENT_RETRIEVALS") {
            if let Ok(v) = val.parse::<usize>() {
                config.pipeline.max_concurrent_retrievals = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("DOC_INQUIRY_MAX_HISTORY_TURNS") {
            if let Ok(v) = val.parse() {
                config.pipeline.max_history_turns = v;
            }
        }

        config
    }

    /// Corpus written by the ingestion pipeline.
    pub fn corpus_path(&self) -> PathBuf {
        self.data_dir.join("corpus.json")
    }
}

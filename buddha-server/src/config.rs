use clap::{Parser, ValueEnum};

pub const DEFAULT_JWT_SECRET: &str = "your-secret-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Hosted Weaviate (REST + GraphQL)
    Weaviate,
    /// Embedded SQLite file with local similarity search
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// OpenAI-compatible `/embeddings`
    Openai,
    /// Offline feature hashing
    Hashing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChunkingStrategy {
    Semantic,
    Recursive,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "buddha-server",
    about = "Dharma assistant and AI agent builder backend"
)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "BUDDHA_LISTEN_ADDR", default_value = "127.0.0.1:3001")]
    pub listen_addr: String,

    /// Vector database backend
    #[arg(long, env = "BUDDHA_STORE", value_enum, default_value_t = StoreBackend::Weaviate)]
    pub store: StoreBackend,

    /// SQLite path for the local backend (`:memory:` for a throwaway store)
    #[arg(long, env = "BUDDHA_LOCAL_DB", default_value = "buddha.db")]
    pub local_db: String,

    /// Weaviate base URL (required for the weaviate backend)
    #[arg(long, env = "WEAVIATE_URL")]
    pub weaviate_url: Option<String>,

    /// Weaviate API key
    #[arg(long, env = "WEAVIATE_API_KEY")]
    pub weaviate_api_key: Option<String>,

    /// OpenAI API key (chat, embeddings, and Weaviate's vectorizer)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Embedding model for the vectorizer and the semantic chunker
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Embedding provider for the local backend and the semantic chunker
    #[arg(long, env = "BUDDHA_EMBEDDER", value_enum, default_value_t = EmbedderKind::Openai)]
    pub embedder: EmbedderKind,

    /// Model answering /ask
    #[arg(long, env = "BUDDHA_CHAT_MODEL", default_value = "gpt-4-turbo-preview")]
    pub chat_model: String,

    /// Model generating section titles
    #[arg(long, env = "BUDDHA_SUMMARY_MODEL", default_value = "gpt-3.5-turbo")]
    pub summary_model: String,

    /// Model driving the agent builder
    #[arg(long, env = "BUDDHA_META_MODEL", default_value = "gpt-4o-mini")]
    pub meta_model: String,

    /// HS256 signing secret for session tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEFAULT_JWT_SECRET)]
    pub jwt_secret: String,

    /// Session token lifetime in hours
    #[arg(long, env = "JWT_TTL_HOURS", default_value = "24")]
    pub jwt_ttl_hours: i64,

    /// How uploaded documents are split before indexing
    #[arg(long, env = "BUDDHA_CHUNKING", value_enum, default_value_t = ChunkingStrategy::Semantic)]
    pub chunking: ChunkingStrategy,

    /// Allowed CORS origin (repeatable). None allows any origin.
    #[arg(long = "cors-origin", env = "BUDDHA_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Base URL for video page lookups
    #[arg(long, env = "YOUTUBE_BASE_URL", default_value = "https://www.youtube.com")]
    pub youtube_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3001".to_string(),
            store: StoreBackend::Weaviate,
            local_db: "buddha.db".to_string(),
            weaviate_url: None,
            weaviate_api_key: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedder: EmbedderKind::Openai,
            chat_model: "gpt-4-turbo-preview".to_string(),
            summary_model: "gpt-3.5-turbo".to_string(),
            meta_model: "gpt-4o-mini".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_ttl_hours: 24,
            chunking: ChunkingStrategy::Semantic,
            cors_origins: Vec::new(),
            youtube_base_url: "https://www.youtube.com".to_string(),
        }
    }
}

//! Server state and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use buddha_agents::{AgentRegistry, LlmClient, MetaAgent};
use buddha_store::{Embedder, HashingEmbedder, LocalStore, OpenAiEmbedder, VectorStore, WeaviateStore};

use crate::auth::AuthService;
use crate::config::{ChunkingStrategy, EmbedderKind, ServerConfig, StoreBackend};
use crate::documents::chunker::Chunker;

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<VectorStore>,
    pub chunker: Chunker,
    /// Answers `/ask`.
    pub chat_llm: LlmClient,
    /// Generates section titles.
    pub summary_llm: LlmClient,
    pub registry: AgentRegistry,
    pub meta: MetaAgent,
    pub auth: AuthService,
    /// Outbound client for video page lookups.
    pub http: reqwest::Client,
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn build_embedder(&self) -> Result<Embedder> {
        Ok(match self.config.embedder {
            EmbedderKind::Openai => {
                let key = self
                    .config
                    .openai_api_key
                    .clone()
                    .context("OPENAI_API_KEY is required for the openai embedder")?;
                Embedder::OpenAi(OpenAiEmbedder::new(
                    key,
                    &self.config.openai_base_url,
                    &self.config.embedding_model,
                ))
            }
            EmbedderKind::Hashing => Embedder::Hashing(HashingEmbedder::default()),
        })
    }

    fn build_store(&self, embedder: &Embedder) -> Result<VectorStore> {
        Ok(match self.config.store {
            StoreBackend::Weaviate => {
                let url = self
                    .config
                    .weaviate_url
                    .as_deref()
                    .context("WEAVIATE_URL is required for the weaviate store")?;
                VectorStore::Weaviate(WeaviateStore::new(
                    url,
                    self.config.weaviate_api_key.clone(),
                    self.config.openai_api_key.clone(),
                    &self.config.embedding_model,
                ))
            }
            StoreBackend::Local if self.config.local_db == ":memory:" => {
                VectorStore::Local(LocalStore::open_memory(embedder.clone())?)
            }
            StoreBackend::Local => {
                VectorStore::Local(LocalStore::open(&self.config.local_db, embedder.clone())?)
            }
        })
    }

    async fn build_state(&self) -> Result<Arc<AppState>> {
        let config = self.config.clone();
        let embedder = self.build_embedder()?;
        let store = Arc::new(self.build_store(&embedder)?);
        store
            .initialize_schema()
            .await
            .context("Failed to initialize vector store schema")?;
        tracing::info!(backend = store.backend(), "Vector store ready");

        let api_key = config.openai_api_key.clone().unwrap_or_else(|| {
            tracing::warn!("OPENAI_API_KEY is not set; model calls will be rejected upstream");
            String::new()
        });
        let base = LlmClient::new(api_key, &config.openai_base_url);
        let chat_llm = base.clone().with_model(&config.chat_model);
        let summary_llm = base.clone().with_model(&config.summary_model);
        let meta_llm = base.clone().with_model(&config.meta_model);

        let registry = AgentRegistry::new(Arc::clone(&store), base);
        let meta = MetaAgent::new(meta_llm, registry.clone());
        let auth = AuthService::new(Arc::clone(&store), &config.jwt_secret, config.jwt_ttl_hours);
        let chunker = match config.chunking {
            ChunkingStrategy::Semantic => Chunker::semantic(embedder),
            ChunkingStrategy::Recursive => Chunker::recursive(),
        };

        Ok(Arc::new(AppState {
            config,
            store,
            chunker,
            chat_llm,
            summary_llm,
            registry,
            meta,
            auth,
            http: reqwest::Client::new(),
        }))
    }

    /// Run the HTTP server until it fails.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state().await?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("HTTP listener on {}", listener.local_addr()?);
        axum::serve(listener, crate::web::router(state)).await?;
        Ok(())
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let state = self.build_state().await?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let router = crate::web::router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });
        Ok((addr, handle))
    }
}

//! buddha-store: vector database access.
//!
//! Two interchangeable backends sit behind [`VectorStore`]:
//! - `weaviate`: hosted Weaviate over REST + GraphQL, vectorized server-side
//! - `local`: a single SQLite file with embeddings computed by an [`Embedder`]
//!
//! The query surface mirrors what the service needs: insert, batch insert,
//! filtered fetch, similarity search, update, delete and count.

pub mod embed;
pub mod error;
pub mod local;
pub mod query;
pub mod schema;
pub mod weaviate;

pub use embed::{cosine_similarity, Embedder, HashingEmbedder, OpenAiEmbedder};
pub use error::StoreError;
pub use local::LocalStore;
pub use query::{FetchQuery, Filter, NearTextQuery, Properties, Sort, StoredObject};
pub use schema::{Collection, DataType};
pub use weaviate::WeaviateStore;

use uuid::Uuid;

/// The configured vector database.
pub enum VectorStore {
    Weaviate(WeaviateStore),
    Local(LocalStore),
}

impl VectorStore {
    /// Short backend name for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            VectorStore::Weaviate(_) => "weaviate",
            VectorStore::Local(_) => "local",
        }
    }

    /// Create every collection that does not exist yet.
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.initialize_schema().await,
            VectorStore::Local(s) => s.initialize_schema(),
        }
    }

    /// Insert one object, returning its id.
    pub async fn insert(
        &self,
        collection: Collection,
        properties: Properties,
        id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.insert(collection, properties, id).await,
            VectorStore::Local(s) => s.insert(collection, properties, id).await,
        }
    }

    /// Insert several objects in one batch.
    pub async fn insert_many(
        &self,
        collection: Collection,
        objects: Vec<Properties>,
    ) -> Result<Vec<Uuid>, StoreError> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            VectorStore::Weaviate(s) => s.insert_many(collection, objects).await,
            VectorStore::Local(s) => s.insert_many(collection, objects).await,
        }
    }

    /// Non-vector search: filter, sort and paginate.
    pub async fn fetch(
        &self,
        collection: Collection,
        query: &FetchQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.fetch(collection, query).await,
            VectorStore::Local(s) => s.fetch(collection, query),
        }
    }

    /// Vector similarity search, best match first.
    pub async fn near_text(
        &self,
        collection: Collection,
        query: &NearTextQuery,
    ) -> Result<Vec<StoredObject>, StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.near_text(collection, query).await,
            VectorStore::Local(s) => s.near_text(collection, query).await,
        }
    }

    pub async fn get(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<StoredObject>, StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.get(collection, id).await,
            VectorStore::Local(s) => s.get(collection, id),
        }
    }

    /// Merge `properties` into an existing object.
    pub async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        properties: Properties,
    ) -> Result<(), StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.update(collection, id, properties).await,
            VectorStore::Local(s) => s.update(collection, id, properties).await,
        }
    }

    pub async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.delete(collection, id).await,
            VectorStore::Local(s) => s.delete(collection, id),
        }
    }

    pub async fn count(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
    ) -> Result<u64, StoreError> {
        match self {
            VectorStore::Weaviate(s) => s.count(collection, filter).await,
            VectorStore::Local(s) => s.count(collection, filter),
        }
    }

    /// First object matching `filter`, if any.
    pub async fn find_one(
        &self,
        collection: Collection,
        filter: Filter,
    ) -> Result<Option<StoredObject>, StoreError> {
        let query = FetchQuery::new(1).with_filter(filter);
        Ok(self.fetch(collection, &query).await?.into_iter().next())
    }
}

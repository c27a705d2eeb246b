use uuid::Uuid;

use crate::schema::Collection;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Vector database error {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("GraphQL error: {0}")]
    GraphQl(String),
    #[error("{collection} object {id} not found")]
    NotFound { collection: Collection, id: Uuid },
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Batch import failed for {failed} objects, first error: {first}")]
    Batch { failed: usize, first: String },
}

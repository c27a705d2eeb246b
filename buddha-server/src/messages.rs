//! `/messages/{session_id}`: a session's stored turns, newest first.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use buddha_store::{Collection, FetchQuery, Filter, Sort, StoreError, VectorStore};

use crate::server::AppState;
use crate::web::ApiError;

pub const DEFAULT_LIMIT: usize = 10;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/messages/{session_id}", get(list_messages))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

pub async fn session_messages(
    store: &VectorStore,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Value>, StoreError> {
    let query = FetchQuery::new(limit)
        .with_filter(Filter::by_property("session_id", session_id))
        .with_sort(Sort::by_property("created_at", false))
        .with_properties(&["content", "role", "created_at"]);
    Ok(store
        .fetch(Collection::Messages, &query)
        .await?
        .into_iter()
        .map(|m| Value::Object(m.properties))
        .collect())
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(q): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(session_messages(&state.store, &session_id, limit).await?))
}

//! `/agents`: the agent registry and the agent-building assistant.
//!
//! Every route needs a signed-in caller. Listing is scoped to the caller;
//! updates and deletes of other authors' agents answer 404.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use buddha_agents::codegen::generate_agent_code;
use buddha_agents::registry::{DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};
use buddha_agents::{AgentUpdate, Context, Language, Message, NewAgent};

use crate::auth::AuthUser;
use crate::server::AppState;
use crate::web::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", get(list).post(create))
        .route("/agents/search", get(search))
        .route("/agents/meta/chat", post(meta_chat))
        .route("/agents/{id}", get(fetch_one).put(update).delete(remove))
        .route("/agents/{id}/code", get(code))
        .route("/agents/{id}/test", post(test))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct MetaChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub contexts: Vec<Context>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<NewAgent>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.registry.create(&user.email, req).await?;
    Ok(Json(json!({
        "message": format!("Agent '{}' created successfully", agent.name),
        "agent": agent,
    })))
}

async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.registry.list(&user.email, limit).await?))
}

async fn search(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if q.q.trim().is_empty() {
        return Err(ApiError::bad_request("q is required"));
    }
    let limit = q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.registry.search(&q.q, limit).await?))
}

async fn fetch_one(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.registry.get(id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<AgentUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.get_owned(id, &user.email).await?;
    let fields = state.registry.update(id, patch).await?;
    Ok(Json(json!({
        "message": "Agent updated successfully",
        "updated_fields": fields,
    })))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.registry.get_owned(id, &user.email).await?;
    state.registry.delete(id).await?;
    Ok(Json(json!({
        "message": format!("Agent '{}' deleted successfully", agent.name),
    })))
}

async fn code(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.registry.get(id).await?;
    Ok(Json(json!({
        "agent_name": agent.name,
        "code": generate_agent_code(&agent),
    })))
}

async fn test(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<TestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.input.trim().is_empty() {
        return Err(ApiError::bad_request("input is required"));
    }
    Ok(Json(state.registry.test(id, &req.input).await?))
}

async fn meta_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<MetaChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .meta
        .respond(&user.email, &req.messages, &req.contexts, req.language)
        .await?;
    Ok(Json(reply))
}

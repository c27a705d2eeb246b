//! Chat sections: named conversations owned by the signed-in user.
//!
//! A section's id doubles as the chat session id. Sections of other authors
//! answer as not found.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use buddha_agents::conversation::now;
use buddha_agents::{summary, Language, LlmClient, Message};
use buddha_store::{
    Collection, FetchQuery, Filter, NearTextQuery, Properties, Sort, StoredObject, VectorStore,
};

use crate::auth::AuthUser;
use crate::server::AppState;
use crate::web::ApiError;

pub const DEFAULT_LIMIT: usize = 10;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sections", get(list).post(create))
        .route("/sections/search", get(search))
        .route("/sections/{id}", get(fetch_one).put(update).delete(remove))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub uuid: Uuid,
    pub title: String,
    pub order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Section {
    fn from_object(obj: &StoredObject) -> Self {
        Self {
            uuid: obj.id,
            title: obj.str("title").unwrap_or_default().to_string(),
            order: obj.properties.get("order").and_then(Value::as_i64).unwrap_or(0),
            created_at: obj.str("created_at").unwrap_or_default().to_string(),
            updated_at: obj.str("updated_at").unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSection {
    pub title: Option<String>,
    pub order: Option<i64>,
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSection {
    pub title: Option<String>,
    pub order: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SectionList {
    pub sections: Vec<Section>,
    pub total: u64,
}

fn by_author(author: &str) -> Filter {
    Filter::by_property("author", author)
}

/// The section if it exists and belongs to `author`.
async fn owned(store: &VectorStore, id: Uuid, author: &str) -> Result<StoredObject, ApiError> {
    match store.get(Collection::Sections, id).await? {
        Some(obj) if obj.str("author") == Some(author) => Ok(obj),
        _ => Err(ApiError::not_found("Section not found")),
    }
}

pub async fn create_section(
    store: &VectorStore,
    llm: &LlmClient,
    author: &str,
    req: CreateSection,
) -> Result<Section, ApiError> {
    let title = match req.title.filter(|t| !t.trim().is_empty()) {
        Some(title) => title,
        None if !req.messages.is_empty() => {
            summary::generate_summary(llm, &req.messages, req.language).await?
        }
        None => return Err(ApiError::bad_request("title or messages is required")),
    };

    let ts = now();
    let mut props = Properties::new();
    props.insert("title".into(), json!(title));
    props.insert("order".into(), json!(req.order.unwrap_or(0)));
    props.insert("created_at".into(), json!(ts));
    props.insert("updated_at".into(), json!(ts));
    props.insert("author".into(), json!(author));
    let id = store.insert(Collection::Sections, props, req.uuid).await?;
    tracing::info!(%id, %author, "Section created");

    Ok(Section {
        uuid: id,
        title,
        order: req.order.unwrap_or(0),
        created_at: ts.clone(),
        updated_at: ts,
    })
}

pub async fn list_sections(
    store: &VectorStore,
    author: &str,
    limit: usize,
    offset: usize,
) -> Result<SectionList, ApiError> {
    let query = FetchQuery::new(limit)
        .with_filter(by_author(author))
        .with_sort(Sort::by_property("created_at", false))
        .with_offset(offset);
    let sections = store
        .fetch(Collection::Sections, &query)
        .await?
        .iter()
        .map(Section::from_object)
        .collect();
    let total = store.count(Collection::Sections, Some(&by_author(author))).await?;
    Ok(SectionList { sections, total })
}

pub async fn update_section(
    store: &VectorStore,
    id: Uuid,
    author: &str,
    req: UpdateSection,
) -> Result<Section, ApiError> {
    owned(store, id, author).await?;
    let mut props = Properties::new();
    if let Some(title) = req.title {
        props.insert("title".into(), json!(title));
    }
    props.insert("order".into(), json!(req.order.unwrap_or(0)));
    props.insert("updated_at".into(), json!(now()));
    store.update(Collection::Sections, id, props).await?;
    Ok(Section::from_object(&owned(store, id, author).await?))
}

pub async fn search_sections(
    store: &VectorStore,
    author: &str,
    q: &str,
    limit: usize,
) -> Result<Vec<Section>, ApiError> {
    let query = NearTextQuery::new(q, limit).with_filter(by_author(author));
    Ok(store
        .near_text(Collection::Sections, &query)
        .await?
        .iter()
        .map(Section::from_object)
        .collect())
}

async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateSection>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        create_section(&state.store, &state.summary_llm, &user.email, req).await?,
    ))
}

async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(
        list_sections(&state.store, &user.email, limit, q.offset.unwrap_or(0)).await?,
    ))
}

async fn search(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if q.q.trim().is_empty() {
        return Err(ApiError::bad_request("q is required"));
    }
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(search_sections(&state.store, &user.email, &q.q, limit).await?))
}

async fn fetch_one(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let obj = owned(&state.store, id, &user.email).await?;
    Ok(Json(Section::from_object(&obj)))
}

async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSection>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(update_section(&state.store, id, &user.email, req).await?))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned(&state.store, id, &user.email).await?;
    state.store.delete(Collection::Sections, id).await?;
    tracing::info!(%id, "Section deleted");
    Ok(Json(json!({ "message": "Section deleted successfully" })))
}

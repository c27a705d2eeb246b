//! `/ask`: retrieval-augmented answers over the uploaded documents.
//!
//! The last user message is the retrieval query. Both the question and the
//! answer are stored in `Messages` under the request's session id. With
//! `options.stream` the answer is sent as server-sent events: `delta`
//! events with text, then one `done` event with sources and contexts.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use buddha_agents::conversation::timestamp;
use buddha_agents::{rag, AskOptions, Context, Message};
use buddha_store::{Collection, NearTextQuery, Properties, StoreError};

use crate::server::AppState;
use crate::web::ApiError;

const RETRIEVAL_LIMIT: usize = 3;
const RETRIEVAL_CERTAINTY: f64 = 0.9;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ask", post(ask))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub options: AskOptions,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub contexts: Vec<Context>,
}

pub fn validate_ask(req: &AskRequest) -> Vec<String> {
    let mut errors = Vec::new();
    if req.messages.is_empty() {
        errors.push("messages is required".to_string());
    }
    if req.session_id.trim().is_empty() {
        errors.push("session_id is required".to_string());
    }
    errors
}

/// Distinct context titles, first occurrence first.
pub fn sources(contexts: &[Context]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in contexts {
        if !out.contains(&c.title) {
            out.push(c.title.clone());
        }
    }
    out
}

async fn retrieve(state: &AppState, query: &str) -> Result<Vec<Context>, StoreError> {
    let q = NearTextQuery::new(query, RETRIEVAL_LIMIT)
        .with_certainty(RETRIEVAL_CERTAINTY)
        .with_properties(&["title", "content"]);
    let docs = state.store.near_text(Collection::Documents, &q).await?;
    Ok(docs
        .into_iter()
        .map(|d| Context {
            title: d.str("title").unwrap_or_default().to_string(),
            content: d.str("content").unwrap_or_default().to_string(),
        })
        .collect())
}

fn message_props(session_id: &str, role: &str, content: &str, created_at: String) -> Properties {
    let mut props = Properties::new();
    props.insert("session_id".into(), json!(session_id));
    props.insert("content".into(), json!(content));
    props.insert("role".into(), json!(role));
    props.insert("created_at".into(), json!(created_at));
    props
}

/// Store the question and the answer; the answer sorts 100 ms after it.
async fn persist(
    state: &AppState,
    session_id: &str,
    question: &Message,
    answer: &str,
) -> Result<(), StoreError> {
    let asked_at = Utc::now();
    let rows = vec![
        message_props(session_id, &question.role, &question.content, timestamp(asked_at)),
        message_props(
            session_id,
            "assistant",
            answer,
            timestamp(asked_at + Duration::milliseconds(100)),
        ),
    ];
    state.store.insert_many(Collection::Messages, rows).await?;
    Ok(())
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let errors = validate_ask(&req);
    if !errors.is_empty() {
        return Err(ApiError::bad_request(errors.join(", ")));
    }
    let question = req
        .messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .cloned()
        .ok_or_else(|| ApiError::bad_request("No user message found"))?;

    let contexts = retrieve(&state, &question.content).await?;
    tracing::info!(
        session_id = %req.session_id,
        contexts = contexts.len(),
        stream = req.options.stream,
        "Answering"
    );

    if req.options.stream {
        return Ok(stream(state, req, question, contexts).into_response());
    }

    let answer = rag::generate_answer(&state.chat_llm, &req.messages, &contexts, &req.options).await?;
    persist(&state, &req.session_id, &question, &answer).await?;
    Ok(Json(AskResponse {
        answer,
        sources: sources(&contexts),
        contexts,
    })
    .into_response())
}

fn stream(
    state: Arc<AppState>,
    req: AskRequest,
    question: Message,
    contexts: Vec<Context>,
) -> Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>> {
    let (events, rx) = mpsc::channel::<Result<Event, Infallible>>(64);

    tokio::spawn(async move {
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
        let forward = {
            let events = events.clone();
            async move {
                while let Some(text) = delta_rx.recv().await {
                    if events.send(Ok(Event::default().event("delta").data(text))).await.is_err() {
                        break;
                    }
                }
            }
        };
        let generate =
            rag::stream_answer(&state.chat_llm, &req.messages, &contexts, &req.options, delta_tx);
        let (result, ()) = tokio::join!(generate, forward);

        let last = match result {
            Ok(answer) => match persist(&state, &req.session_id, &question, &answer).await {
                Ok(()) => Event::default()
                    .event("done")
                    .json_data(json!({ "sources": sources(&contexts), "contexts": contexts })),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to store streamed answer");
                    Event::default()
                        .event("error")
                        .json_data(json!({ "error": format!("Database error: {e}") }))
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Streaming answer failed");
                Event::default()
                    .event("error")
                    .json_data(json!({ "error": format!("Language model error: {e}") }))
            }
        };
        match last {
            Ok(event) => {
                let _ = events.send(Ok(event)).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode final event"),
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        let errors = validate_ask(&AskRequest::default());
        assert_eq!(errors, vec!["messages is required", "session_id is required"]);

        let req = AskRequest {
            messages: vec![Message::new("user", "hi")],
            session_id: "  ".into(),
            ..AskRequest::default()
        };
        assert_eq!(validate_ask(&req), vec!["session_id is required"]);
    }

    #[test]
    fn sources_keep_first_seen_order() {
        let ctx = |t: &str| Context {
            title: t.into(),
            content: String::new(),
        };
        let contexts = vec![ctx("b.pdf"), ctx("a.pdf"), ctx("b.pdf")];
        assert_eq!(sources(&contexts), vec!["b.pdf", "a.pdf"]);
    }
}

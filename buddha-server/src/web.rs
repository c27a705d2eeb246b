//! HTTP surface: router assembly, error responses, and shared middleware.
//!
//! Every route lives under `/api/v1`. Handlers return `Result<_, ApiError>`
//! so that domain errors render as `{"error": "..."}` with a fitting status.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use buddha_agents::{AgentError, LlmError};
use buddha_store::StoreError;

use crate::server::AppState;

/// An error rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Store error");
        match e {
            StoreError::NotFound { .. } => ApiError::not_found(e.to_string()),
            _ => ApiError::internal(format!("Database error: {e}")),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        tracing::error!(error = %e, "LLM error");
        ApiError::bad_gateway(format!("Language model error: {e}"))
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::NotFound(_) => ApiError::not_found("Agent not found"),
            AgentError::InvalidInput(msg) => ApiError::bad_request(msg),
            AgentError::Llm(e) => e.into(),
            AgentError::Store(e) => e.into(),
            AgentError::TooManySteps(_) => {
                tracing::warn!(error = %e, "Meta agent gave up");
                ApiError::bad_gateway(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn api_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(
            origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()),
        ))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(api_health))
        .merge(crate::auth::api::routes())
        .merge(crate::ask::routes())
        .merge(crate::messages::routes())
        .merge(crate::sections::routes())
        .merge(crate::documents::api::routes())
        .merge(crate::agents::routes())
        .merge(crate::youtube::routes());

    Router::new()
        .nest("/api/v1", api)
        .layer(axum::extract::DefaultBodyLimit::max(12 * 1024 * 1024)) // 12MB
        .layer(cors(&state.config.cors_origins))
        .with_state(state)
        .layer(axum::middleware::from_fn(security_headers))
}

/// Security headers middleware.
async fn security_headers(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_errors_map_to_statuses() {
        let e: ApiError = AgentError::NotFound(uuid::Uuid::new_v4()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.message, "Agent not found");

        let e: ApiError = AgentError::InvalidInput("name is required".into()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e: ApiError = AgentError::TooManySteps(8).into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);

        let e: ApiError = LlmError::Api { status: 500, body: "boom".into() }.into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
    }
}

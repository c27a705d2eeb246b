//! `/youtube/{video_id}`: title, channel and view count scraped from the
//! public watch page.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::server::AppState;
use crate::web::ApiError;

pub const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const INITIAL_DATA: &str = r"var ytInitialData = (\{.*?\});";
const PRIMARY_INFO: &str =
    "/contents/twoColumnWatchNextResults/results/results/contents/0/videoPrimaryInfoRenderer";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/youtube/{video_id}", get(video_metadata))
}

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Invalid YouTube video ID format")]
    InvalidId,
    #[error("Video not found")]
    NotFound,
    #[error("Access to video is restricted")]
    Restricted,
    #[error("Failed to fetch video: HTTP {0}")]
    Http(u16),
    #[error("Could not extract video data")]
    MissingData,
    #[error("Could not read video details")]
    MissingDetails,
    #[error("Invalid video data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to fetch video metadata after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<VideoError>,
    },
}

impl VideoError {
    pub fn status(&self) -> StatusCode {
        match self {
            VideoError::NotFound => StatusCode::NOT_FOUND,
            VideoError::Restricted => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<VideoError> for ApiError {
    fn from(e: VideoError) -> Self {
        ApiError::new(e.status(), e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub channel_title: String,
    pub published_at: Option<String>,
    pub view_count: String,
    pub transcript: Option<String>,
}

pub fn valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn first_run(details: &Value, field: &str) -> String {
    details
        .pointer(&format!("/{field}/runs/0/text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Read the metadata out of a watch page.
pub fn parse_watch_page(html: &str) -> Result<VideoMetadata, VideoError> {
    let blob = Regex::new(INITIAL_DATA)
        .ok()
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .ok_or(VideoError::MissingData)?;
    let data: Value = serde_json::from_str(blob.as_str())?;
    let details = data.pointer(PRIMARY_INFO).ok_or(VideoError::MissingDetails)?;

    Ok(VideoMetadata {
        title: first_run(details, "title"),
        channel_title: first_run(details, "ownerText"),
        published_at: None,
        view_count: details
            .pointer("/viewCount/videoViewCountRenderer/viewCount/simpleText")
            .and_then(Value::as_str)
            .unwrap_or("0")
            .to_string(),
        transcript: None,
    })
}

async fn fetch_once(
    http: &reqwest::Client,
    base_url: &str,
    video_id: &str,
) -> Result<VideoMetadata, VideoError> {
    let url = format!("{}/watch?v={video_id}", base_url.trim_end_matches('/'));
    let resp = http.get(&url).send().await?;
    match resp.status() {
        StatusCode::NOT_FOUND => return Err(VideoError::NotFound),
        StatusCode::FORBIDDEN => return Err(VideoError::Restricted),
        s if !s.is_success() => return Err(VideoError::Http(s.as_u16())),
        _ => {}
    }
    parse_watch_page(&resp.text().await?)
}

/// Fetch with retries. Not-found and restricted videos fail immediately.
pub async fn fetch_metadata(
    http: &reqwest::Client,
    base_url: &str,
    video_id: &str,
) -> Result<VideoMetadata, VideoError> {
    if !valid_video_id(video_id) {
        return Err(VideoError::InvalidId);
    }

    let mut last = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match fetch_once(http, base_url, video_id).await {
            Ok(meta) => return Ok(meta),
            Err(e @ (VideoError::NotFound | VideoError::Restricted)) => return Err(e),
            Err(e) => {
                tracing::warn!(%video_id, attempt, error = %e, "Video metadata fetch failed");
                last = Some(e);
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    Err(VideoError::Exhausted {
        attempts: MAX_ATTEMPTS,
        last: Box::new(last.unwrap_or(VideoError::MissingData)),
    })
}

async fn video_metadata(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let meta = fetch_metadata(&state.http, &state.config.youtube_base_url, &video_id).await?;
    Ok(Json(meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><script>var ytInitialData = {"contents":{"twoColumnWatchNextResults":{"results":{"results":{"contents":[{"videoPrimaryInfoRenderer":{"title":{"runs":[{"text":"Pháp thoại"}]},"ownerText":{"runs":[{"text":"Làng Mai"}]},"viewCount":{"videoViewCountRenderer":{"viewCount":{"simpleText":"1.234 lượt xem"}}}}}]}}}}};</script></html>"#;

    #[test]
    fn video_id_format() {
        assert!(valid_video_id("dQw4w9WgXcQ"));
        assert!(valid_video_id("a-b_c-d_e-f"));
        assert!(!valid_video_id("short"));
        assert!(!valid_video_id("dQw4w9WgXcQQ"));
        assert!(!valid_video_id("dQw4w9WgX!Q"));
    }

    #[test]
    fn parses_primary_info() {
        let meta = parse_watch_page(PAGE).unwrap();
        assert_eq!(meta.title, "Pháp thoại");
        assert_eq!(meta.channel_title, "Làng Mai");
        assert_eq!(meta.view_count, "1.234 lượt xem");
        assert_eq!(meta.published_at, None);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["channelTitle"], "Làng Mai");
        assert!(json["transcript"].is_null());
    }

    #[test]
    fn view_count_defaults_to_zero() {
        let page = r#"var ytInitialData = {"contents":{"twoColumnWatchNextResults":{"results":{"results":{"contents":[{"videoPrimaryInfoRenderer":{}}]}}}}};"#;
        let meta = parse_watch_page(page).unwrap();
        assert_eq!(meta.view_count, "0");
        assert_eq!(meta.title, "");
    }

    #[test]
    fn missing_blob() {
        let err = parse_watch_page("<html></html>").unwrap_err();
        assert_eq!(err.to_string(), "Could not extract video data");
    }

    #[test]
    fn exhausted_message_and_statuses() {
        let err = VideoError::Exhausted {
            attempts: 3,
            last: Box::new(VideoError::Http(500)),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch video metadata after 3 attempts: Failed to fetch video: HTTP 500"
        );
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(VideoError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(VideoError::Restricted.status(), StatusCode::FORBIDDEN);
    }
}

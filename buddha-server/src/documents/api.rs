use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use buddha_store::{Collection, Properties, VectorStore};

use super::chunker::Chunker;
use super::{pdf, IngestError};
use crate::server::AppState;
use crate::web::ApiError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload-documents", post(upload_documents))
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct ChunkView {
    pub content: String,
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub filename: String,
    pub num_chunks: usize,
    pub chunks: Vec<ChunkView>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub description: String,
    pub results: Vec<FileResult>,
}

async fn read_form(mut multipart: Multipart) -> Result<(Vec<Upload>, String), IngestError> {
    let mut files = Vec::new();
    let mut description = String::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| IngestError::Multipart(e.to_string()))?;
                if !filename.is_empty() {
                    files.push(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "description" => {
                description = field
                    .text()
                    .await
                    .map_err(|e| IngestError::Multipart(e.to_string()))?;
            }
            _ => {}
        }
    }
    Ok((files, description))
}

/// Extract, chunk and store every file. All names are checked before any
/// file is processed.
pub async fn ingest(
    store: &VectorStore,
    chunker: &Chunker,
    files: Vec<Upload>,
) -> Result<Vec<FileResult>, IngestError> {
    if files.is_empty() {
        return Err(IngestError::NoFiles);
    }
    if let Some(bad) = files.iter().find(|f| !pdf::allowed_file(&f.filename)) {
        return Err(IngestError::NotPdf(bad.filename.clone()));
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let text = pdf::extract_text(&file.filename, file.bytes).await?;
        let chunks = chunker.split(&text).await?;
        let rows: Vec<Properties> = chunks
            .iter()
            .map(|chunk| {
                let mut props = Properties::new();
                props.insert("title".into(), json!(file.filename));
                props.insert("content".into(), json!(chunk));
                props
            })
            .collect();
        store.insert_many(Collection::Documents, rows).await?;
        tracing::info!(file = %file.filename, chunks = chunks.len(), "Document ingested");

        results.push(FileResult {
            num_chunks: chunks.len(),
            chunks: chunks
                .into_iter()
                .enumerate()
                .map(|(index, content)| ChunkView {
                    content,
                    metadata: json!({ "source": file.filename, "index": index }),
                })
                .collect(),
            filename: file.filename,
        });
    }
    Ok(results)
}

async fn upload_documents(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (files, description) = read_form(multipart).await?;
    let results = ingest(&state.store, &state.chunker, files).await?;
    Ok(Json(UploadResponse {
        status: "success",
        description,
        results,
    }))
}

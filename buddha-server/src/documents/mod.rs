//! PDF ingestion: extract text, chunk it, store the chunks in `Documents`.

pub mod api;
pub mod chunker;
pub mod pdf;

use buddha_store::StoreError;

use crate::web::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No files uploaded")]
    NoFiles,
    #[error("File type not allowed for {0}. Only PDF files are accepted.")]
    NotPdf(String),
    #[error("Invalid multipart body: {0}")]
    Multipart(String),
    #[error("Failed to extract text from {name}: {reason}")]
    Pdf { name: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Store(e) => e.into(),
            pdf @ IngestError::Pdf { .. } => ApiError::internal(pdf.to_string()),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

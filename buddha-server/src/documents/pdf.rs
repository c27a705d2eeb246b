use std::panic;

use super::IngestError;

/// Only `.pdf` files are accepted, case-insensitively.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("pdf"))
}

/// Drop blank pages and join the rest with a blank line.
pub fn join_pages(raw: &str) -> String {
    raw.split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Extract the text of a PDF held in memory.
///
/// Runs on the blocking pool; pdf-extract can panic on some fonts, which is
/// reported as an extraction error.
pub async fn extract_text(name: &str, bytes: Vec<u8>) -> Result<String, IngestError> {
    let fail = |reason: String| IngestError::Pdf {
        name: name.to_string(),
        reason,
    };
    let result = tokio::task::spawn_blocking(move || {
        panic::catch_unwind(move || pdf_extract::extract_text_from_mem(&bytes))
    })
    .await
    .map_err(|e| fail(e.to_string()))?;

    match result {
        Ok(Ok(text)) => Ok(join_pages(&text)),
        Ok(Err(e)) => Err(fail(e.to_string())),
        Err(_) => {
            tracing::warn!(file = name, "pdf-extract panicked");
            Err(fail("the PDF could not be parsed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_only() {
        assert!(allowed_file("sutra.pdf"));
        assert!(allowed_file("Kinh.PDF"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("pdf"));
        assert!(!allowed_file("archive.pdf.zip"));
    }

    #[test]
    fn pages_are_trimmed_and_joined() {
        let raw = "  page one \x0c\x0c\n page two\n\x0c   ";
        assert_eq!(join_pages(raw), "page one\n\npage two");
    }

    #[tokio::test]
    async fn garbage_bytes_fail_cleanly() {
        let err = extract_text("bad.pdf", b"not a pdf".to_vec()).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to extract text from bad.pdf"));
    }
}

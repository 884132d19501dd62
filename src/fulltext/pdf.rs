use super::FetchError;

/// Extract text from a PDF, one string per page. Runs on the blocking pool.
pub async fn pdf_pages(bytes: Vec<u8>) -> Result<Vec<String>, FetchError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| FetchError::Parse(format!("PDF text extraction failed: {}", e)))
    })
    .await
    .map_err(|e| FetchError::Parse(format!("PDF extraction task: {}", e)))?
}

/// Pages concatenated as extracted.
pub fn join_raw(pages: &[String]) -> String {
    pages.concat()
}

/// Each page's lines trimmed and joined with spaces, pages separated by a
/// space.
pub fn join_trimmed_lines(pages: &[String]) -> String {
    pages
        .iter()
        .map(|page| {
            page.lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_trimmed_lines() {
        let pages = vec!["  Title\n  body one  \n".to_string(), "page two\nend".to_string()];
        assert_eq!(join_trimmed_lines(&pages), "Title body one page two end");
    }

    #[tokio::test]
    async fn test_garbage_is_a_parse_error() {
        let err = pdf_pages(b"definitely not a pdf".to_vec()).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }
}

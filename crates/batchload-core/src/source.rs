//! URL list loading

use crate::error::LoaderError;
use std::path::Path;
use tracing::debug;

/// Read a URL list file: one URL per line, blank lines skipped
pub async fn read_url_list(path: &Path) -> Result<Vec<String>, LoaderError> {
    if path.as_os_str().is_empty() || !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(LoaderError::UrlListNotFound(path.to_path_buf()));
    }

    let contents = tokio::fs::read_to_string(path).await?;
    let urls = parse_url_list(&contents);
    debug!("Read {} URLs from {}", urls.len(), path.display());

    Ok(urls)
}

/// Split text into URLs, trimming whitespace and dropping blank lines
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_lines_and_keeps_order() {
        let urls = parse_url_list("http://x/b.bin\n\n   \n http://x/a.bin \r\nhttp://x/b.bin\n");
        assert_eq!(
            urls,
            vec!["http://x/b.bin", "http://x/a.bin", "http://x/b.bin"]
        );
    }

    #[tokio::test]
    async fn test_read_url_list_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let list = tmp.path().join("urls.txt");
        std::fs::write(&list, "http://x/1.bin\n\nhttp://x/2.bin\n").unwrap();

        let urls = read_url_list(&list).await.unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_list_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_url_list(&tmp.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::UrlListNotFound(_)));
        assert!(err.is_fatal());
    }
}

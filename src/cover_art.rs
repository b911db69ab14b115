//! Cover art lookup through the Open Library API
//!
//! Search by title, pick an ISBN, then fetch `<image_url>/<isbn>-L.jpg`.
//! Every failure is non-fatal to the caller: the book simply has no cover.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::Settings;
use crate::error::CoverArtError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    isbn: Option<Vec<String>>,
    #[serde(default)]
    cover_i: Option<i64>,
}

impl SearchDoc {
    fn first_isbn(&self) -> Option<&str> {
        self.isbn.as_ref()?.first().map(String::as_str)
    }
}

/// Prefer a result with both an ISBN and a cover id, else any ISBN
fn pick_isbn(docs: &[SearchDoc]) -> Option<&str> {
    docs.iter()
        .filter(|d| d.cover_i.is_some())
        .find_map(SearchDoc::first_isbn)
        .or_else(|| docs.iter().find_map(SearchDoc::first_isbn))
}

/// Client for the cover-art service
pub struct CoverArtClient {
    http: reqwest::Client,
    search_url: String,
    image_url: String,
}

impl CoverArtClient {
    pub fn new(settings: &Settings) -> Result<Self, CoverArtError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            search_url: settings.cover_search_url.clone(),
            image_url: settings.cover_image_url.trim_end_matches('/').to_string(),
        })
    }

    /// Find and save a cover for `title` as `dest`, logging the outcome
    pub async fn fetch_cover(&self, title: &str, dest: &Path) -> Option<PathBuf> {
        log::info!("  [Cover Art] Searching for cover for: {}", title);
        match self.try_fetch_cover(title, dest).await {
            Ok(path) => {
                log::info!(
                    "  [Cover Art] Successfully downloaded cover to: {}",
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                log::warn!("  [Cover Art] No cover for {}: {}", title, e);
                None
            }
        }
    }

    async fn try_fetch_cover(&self, title: &str, dest: &Path) -> Result<PathBuf, CoverArtError> {
        let search: SearchResponse = self
            .http
            .get(&self.search_url)
            .query(&[("title", title), ("fields", "*,isbn,cover_i")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if search.docs.is_empty() {
            return Err(CoverArtError::NoResults);
        }
        let isbn = pick_isbn(&search.docs).ok_or(CoverArtError::NoIsbn)?;

        let cover_url = format!("{}/{}-L.jpg", self.image_url, isbn);
        log::debug!("  [Cover Art] Downloading from: {}", cover_url);
        let response = self.http.get(&cover_url).send().await?.error_for_status()?;

        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("image"));
        if !is_image {
            return Err(CoverArtError::NotAnImage(isbn.to_string()));
        }

        let bytes = response.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(isbn: Option<Vec<&str>>, cover: Option<i64>) -> SearchDoc {
        SearchDoc {
            isbn: isbn.map(|v| v.into_iter().map(String::from).collect()),
            cover_i: cover,
        }
    }

    #[test]
    fn test_pick_isbn_prefers_entry_with_cover() {
        let docs = vec![
            doc(Some(vec!["111"]), None),
            doc(None, Some(7)),
            doc(Some(vec!["222", "333"]), Some(9)),
        ];
        assert_eq!(pick_isbn(&docs), Some("222"));
    }

    #[test]
    fn test_pick_isbn_falls_back_to_any_isbn() {
        let docs = vec![doc(None, Some(1)), doc(Some(vec!["444"]), None)];
        assert_eq!(pick_isbn(&docs), Some("444"));
    }

    #[test]
    fn test_pick_isbn_none() {
        let docs = vec![doc(None, Some(1)), doc(Some(vec![]), None)];
        assert_eq!(pick_isbn(&docs), None);
        assert_eq!(pick_isbn(&[]), None);
    }

    #[test]
    fn test_search_response_tolerates_missing_fields() {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"numFound": 1, "docs": [{"title": "Dune"}]}"#).unwrap();
        assert_eq!(parsed.docs.len(), 1);
        assert!(parsed.docs[0].first_isbn().is_none());

        let parsed: SearchResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parsed.docs.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_no_cover() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut settings = Settings::new(temp.path().join("audiobooks"));
        settings.cover_search_url = "http://127.0.0.1:9/search.json".to_string();
        let client = CoverArtClient::new(&settings).unwrap();

        let dest = temp.path().join("covers").join("cover.jpg");
        assert!(client.fetch_cover("Dune", &dest).await.is_none());
        assert!(!dest.exists());
    }
}

//! Open Library search provider (books)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{CatalogProvider, ProviderError, SearchQuery};
use crate::models::{CatalogCandidate, ShelfKind};

pub const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";
const COVER_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// `search.json` response
#[derive(Debug, Clone, Deserialize)]
struct OlSearchResponse {
    #[serde(default)]
    docs: Vec<OlDoc>,
}

/// One work in a search response
#[derive(Debug, Clone, Deserialize)]
struct OlDoc {
    /// Work key, e.g. `/works/OL893415W`
    key: String,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    isbn: Vec<String>,
    cover_i: Option<i64>,
    #[serde(default)]
    format: Vec<String>,
}

pub struct OpenLibraryProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenLibraryProvider {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CatalogProvider for OpenLibraryProvider {
    fn name(&self) -> &str {
        "openlibrary"
    }

    fn supports_shelf_type(&self, kind: ShelfKind) -> bool {
        kind == ShelfKind::Book
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogCandidate>, ProviderError> {
        let url = format!("{}/search.json", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("title", query.title.clone()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(creator) = &query.creator {
            params.push(("author", creator.clone()));
        }
        if let Some(platform) = &query.platform {
            params.push(("q", format!("format:{}", platform)));
        }

        tracing::debug!(title = %query.title, url = %url, "Querying Open Library");

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body = response.text().await.map_err(ProviderError::from_reqwest)?;
        parse_search_response(&body)
    }
}

/// Convert a `search.json` body into candidates
fn parse_search_response(body: &str) -> Result<Vec<CatalogCandidate>, ProviderError> {
    let parsed: OlSearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    Ok(parsed
        .docs
        .into_iter()
        .filter_map(|doc| {
            let title = doc.title.filter(|t| !t.trim().is_empty())?;
            let mut candidate =
                CatalogCandidate::new("openlibrary", title).with_identifier("openlibrary", doc.key);
            if let Some(author) = doc.author_name.into_iter().next() {
                candidate = candidate.with_creator(author);
            }
            if let Some(year) = doc.first_publish_year {
                candidate = candidate.with_release_date(year.to_string());
            }
            if let Some(isbn) = doc.isbn.into_iter().next() {
                candidate = candidate.with_identifier("isbn", isbn);
            }
            if let Some(cover) = doc.cover_i {
                candidate.images.push(format!("{}/{}-L.jpg", COVER_BASE_URL, cover));
            }
            candidate.format = doc.format.into_iter().next();
            Some(candidate)
        })
        .collect())
}

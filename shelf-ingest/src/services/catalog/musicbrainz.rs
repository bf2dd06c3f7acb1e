//! MusicBrainz release-group search provider (music)
//!
//! MusicBrainz rejects anonymous clients: a descriptive User-Agent with
//! contact information is mandatory. Its published limit is one request per
//! second, which the adapter settings for this provider default to.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{CatalogProvider, ProviderError, SearchQuery};
use crate::models::{CatalogCandidate, ShelfKind};

pub const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const COVER_ART_BASE_URL: &str = "https://coverartarchive.org/release-group";

/// MusicBrainz release-group search response
#[derive(Debug, Clone, Deserialize)]
struct MbSearchResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<MbReleaseGroup>,
}

#[derive(Debug, Clone, Deserialize)]
struct MbReleaseGroup {
    /// Release group MBID
    id: String,
    title: String,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    secondary_types: Vec<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Clone, Deserialize)]
struct MbArtistCredit {
    /// Display name (may differ from artist.name for collaborations)
    name: String,
    artist: MbArtist,
}

#[derive(Debug, Clone, Deserialize)]
struct MbArtist {
    id: String,
}

pub struct MusicBrainzProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl MusicBrainzProvider {
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
impl CatalogProvider for MusicBrainzProvider {
    fn name(&self) -> &str {
        "musicbrainz"
    }

    fn supports_shelf_type(&self, kind: ShelfKind) -> bool {
        kind == ShelfKind::Music
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogCandidate>, ProviderError> {
        let url = format!("{}/release-group", self.base_url);
        let lucene = build_lucene_query(query);

        tracing::debug!(query = %lucene, url = %url, "Querying MusicBrainz API");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("query", lucene),
                ("fmt", "json".to_string()),
                ("limit", query.limit.to_string()),
            ])
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

fn escape_lucene(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn build_lucene_query(query: &SearchQuery) -> String {
    let mut lucene = format!("releasegroup:\"{}\"", escape_lucene(&query.title));
    if let Some(creator) = &query.creator {
        lucene.push_str(&format!(" AND artist:\"{}\"", escape_lucene(creator)));
    }
    if let Some(platform) = &query.platform {
        lucene.push_str(&format!(" AND \"{}\"", escape_lucene(platform)));
    }
    lucene
}

fn parse_search_response(body: &str) -> Result<Vec<CatalogCandidate>, ProviderError> {
    let parsed: MbSearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    Ok(parsed
        .release_groups
        .into_iter()
        .map(|group| {
            let mut candidate = CatalogCandidate::new("musicbrainz", group.title)
                .with_identifier("musicbrainz_release_group", group.id.clone());
            if let Some(credit) = group.artist_credit.first() {
                candidate = candidate
                    .with_creator(credit.name.clone())
                    .with_identifier("musicbrainz_artist", credit.artist.id.clone());
            }
            if let Some(date) = group.first_release_date.filter(|d| !d.is_empty()) {
                candidate = candidate.with_release_date(date);
            }
            // Secondary types (Compilation, Remix...) are more specific than the primary one
            candidate.category = group
                .secondary_types
                .into_iter()
                .next()
                .or(group.primary_type);
            candidate
                .images
                .push(format!("{}/{}/front", COVER_ART_BASE_URL, group.id));
            candidate
        })
        .collect())
}

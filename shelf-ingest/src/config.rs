//! Service configuration for shelf-ingest
//!
//! Lives in the same TOML file as [`shelf_common::config::TomlConfig`]:
//!
//! ```toml
//! [pipeline]
//! confidence_min = 0.85
//! confidence_max = 0.92
//!
//! [matching]
//! similarity_floor = 0.88
//!
//! [providers]
//! user_agent = "shelf-ingest/0.1 (ops@example.org)"
//!
//! [providers.musicbrainz]
//! requests_per_second = 1
//! concurrency = 3
//!
//! [jobs]
//! ttl_secs = 300
//! ```
//!
//! Every key is optional. `SHELF_CONFIDENCE_MIN` / `SHELF_CONFIDENCE_MAX`
//! override the thresholds from the file.

use serde::{Deserialize, Serialize};
use shelf_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::catalog::musicbrainz::MUSICBRAINZ_BASE_URL;
use crate::services::catalog::open_library::OPEN_LIBRARY_BASE_URL;
use crate::services::catalog::{
    AdapterSettings, CatalogChain, CatalogProvider, MusicBrainzProvider, OpenLibraryProvider,
    ProviderAdapter, ProviderError,
};
use crate::services::confidence_router::{
    ConfidenceThresholds, DEFAULT_CONFIDENCE_MAX, DEFAULT_CONFIDENCE_MIN,
};
use crate::services::matching::DEFAULT_SIMILARITY_FLOOR;

pub const CONFIDENCE_MIN_ENV: &str = "SHELF_CONFIDENCE_MIN";
pub const CONFIDENCE_MAX_ENV: &str = "SHELF_CONFIDENCE_MAX";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_confidence_min")]
    pub confidence_min: f64,
    #[serde(default = "default_confidence_max")]
    pub confidence_max: f64,
}

fn default_confidence_min() -> f64 {
    DEFAULT_CONFIDENCE_MIN
}

fn default_confidence_max() -> f64 {
    DEFAULT_CONFIDENCE_MAX
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_min: DEFAULT_CONFIDENCE_MIN,
            confidence_max: DEFAULT_CONFIDENCE_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum title/creator similarity for reusing a persisted record
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f64,
}

fn default_similarity_floor() -> f64 {
    DEFAULT_SIMILARITY_FLOOR
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_floor: DEFAULT_SIMILARITY_FLOOR,
        }
    }
}

/// One catalog provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider's public endpoint when unset
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(flatten)]
    pub limits: AdapterSettings,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url.as_deref().unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Sent with every provider request (MusicBrainz requires contact info)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_open_library")]
    pub openlibrary: ProviderConfig,

    #[serde(default = "default_musicbrainz")]
    pub musicbrainz: ProviderConfig,
}

fn default_user_agent() -> String {
    format!("shelf-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_open_library() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        base_url: Some(OPEN_LIBRARY_BASE_URL.to_string()),
        limits: AdapterSettings {
            requests_per_second: 3,
            ..AdapterSettings::default()
        },
    }
}

fn default_musicbrainz() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        base_url: Some(MUSICBRAINZ_BASE_URL.to_string()),
        limits: AdapterSettings {
            requests_per_second: 1,
            ..AdapterSettings::default()
        },
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_request_timeout_secs(),
            openlibrary: default_open_library(),
            musicbrainz: default_musicbrainz(),
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Build the catalog chain from the enabled providers
    ///
    /// Dispatch order: Open Library, then MusicBrainz.
    pub fn build_chain(&self) -> std::result::Result<CatalogChain, ProviderError> {
        let mut adapters = Vec::new();

        if self.openlibrary.enabled {
            let provider = OpenLibraryProvider::new(
                self.openlibrary.base_url_or(OPEN_LIBRARY_BASE_URL),
                &self.user_agent,
                self.timeout(),
            )?;
            adapters.push(wrap(Arc::new(provider), &self.openlibrary));
        }

        if self.musicbrainz.enabled {
            let provider = MusicBrainzProvider::new(
                self.musicbrainz.base_url_or(MUSICBRAINZ_BASE_URL),
                &self.user_agent,
                self.timeout(),
            )?;
            adapters.push(wrap(Arc::new(provider), &self.musicbrainz));
        }

        let chain = CatalogChain::new(adapters);
        info!(providers = ?chain.provider_names(), "Catalog chain configured");
        Ok(chain)
    }
}

fn wrap(provider: Arc<dyn CatalogProvider>, config: &ProviderConfig) -> Arc<ProviderAdapter> {
    Arc::new(ProviderAdapter::new(provider, config.limits))
}

/// Vision or enrichment endpoint; disabled when `endpoint` is unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(60).max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl JobsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub extraction: EndpointConfig,
    #[serde(default)]
    pub enrichment: EndpointConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl IngestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from `path` (defaults when absent), apply environment overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
                })?;
                info!(path = %path.display(), "Loaded ingest configuration");
                Self::from_toml_str(&content)?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHELF_CONFIDENCE_MIN` / `SHELF_CONFIDENCE_MAX`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(min) = env_f64(CONFIDENCE_MIN_ENV)? {
            self.pipeline.confidence_min = min;
        }
        if let Some(max) = env_f64(CONFIDENCE_MAX_ENV)? {
            self.pipeline.confidence_max = max;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds()?;
        if !(0.0..=1.0).contains(&self.matching.similarity_floor) {
            return Err(Error::Config(format!(
                "matching.similarity_floor must be within [0, 1], got {}",
                self.matching.similarity_floor
            )));
        }
        if self.jobs.ttl_secs == 0 {
            warn!("jobs.ttl_secs is 0: jobs expire immediately");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<ConfidenceThresholds> {
        ConfidenceThresholds::new(self.pipeline.confidence_min, self.pipeline.confidence_max)
    }
}

fn env_f64(name: &str) -> Result<Option<f64>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not a number ({}): {}", name, value, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(CONFIDENCE_MIN_ENV);
        std::env::remove_var(CONFIDENCE_MAX_ENV);
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.pipeline.confidence_min, 0.85);
        assert_eq!(config.pipeline.confidence_max, 0.92);
        assert_eq!(config.matching.similarity_floor, 0.88);
        assert_eq!(config.providers.musicbrainz.limits.requests_per_second, 1);
        assert_eq!(config.providers.openlibrary.limits.concurrency, 3);
        assert_eq!(config.providers.openlibrary.limits.max_retries, 3);
        assert_eq!(config.jobs.ttl(), Duration::from_secs(300));
        assert!(config.extraction.endpoint.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            root_folder = "/srv/shelf"

            [pipeline]
            confidence_min = 0.8

            [providers.musicbrainz]
            base_url = "http://localhost:5000/ws/2"
            concurrency = 1

            [jobs]
            ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.confidence_min, 0.8);
        assert_eq!(config.pipeline.confidence_max, 0.92);
        assert_eq!(
            config.providers.musicbrainz.base_url_or(MUSICBRAINZ_BASE_URL),
            "http://localhost:5000/ws/2"
        );
        assert_eq!(config.providers.musicbrainz.limits.concurrency, 1);
        assert_eq!(config.providers.musicbrainz.limits.max_retries, 3);
        assert!(config.providers.musicbrainz.enabled);
        assert_eq!(
            config.providers.openlibrary.base_url_or(""),
            OPEN_LIBRARY_BASE_URL
        );
        assert_eq!(config.jobs.ttl_secs, 60);
        assert_eq!(config.jobs.sweep_interval_secs, 30);
    }

    #[test]
    fn test_build_chain_skips_disabled_providers() {
        let mut providers = ProvidersConfig::default();
        let chain = providers.build_chain().unwrap();
        assert_eq!(chain.provider_names(), vec!["openlibrary", "musicbrainz"]);

        providers.openlibrary.enabled = false;
        let chain = providers.build_chain().unwrap();
        assert_eq!(chain.provider_names(), vec!["musicbrainz"]);
        assert_eq!(
            chain.adapter_for(crate::models::ShelfKind::Music).unwrap().settings().requests_per_second,
            1
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_thresholds() {
        clear_env();
        std::env::set_var(CONFIDENCE_MIN_ENV, "0.7");
        std::env::set_var(CONFIDENCE_MAX_ENV, "0.95");

        let config = IngestConfig::load(None).unwrap();
        assert_eq!(config.pipeline.confidence_min, 0.7);
        assert_eq!(config.pipeline.confidence_max, 0.95);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_thresholds_rejected() {
        clear_env();
        std::env::set_var(CONFIDENCE_MIN_ENV, "0.95");
        std::env::set_var(CONFIDENCE_MAX_ENV, "0.9");
        assert!(matches!(IngestConfig::load(None), Err(Error::Config(_))));

        std::env::set_var(CONFIDENCE_MIN_ENV, "high");
        assert!(matches!(IngestConfig::load(None), Err(Error::Config(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, "[matching]\nsimilarity_floor = 0.9\n").unwrap();

        let config = IngestConfig::load(Some(&path)).unwrap();
        assert_eq!(config.matching.similarity_floor, 0.9);

        std::fs::write(&path, "[matching]\nsimilarity_floor = 1.5\n").unwrap();
        assert!(IngestConfig::load(Some(&path)).is_err());

        // Missing file: defaults
        let missing = dir.path().join("missing.toml");
        assert_eq!(IngestConfig::load(Some(&missing)).unwrap(), IngestConfig::default());
    }
}

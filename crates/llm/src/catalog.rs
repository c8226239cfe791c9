use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Deserialize;
use snafu::{ResultExt, ensure};
use tokio::sync::RwLock;

use super::provider::{ModelPayloadParseSnafu, NoModelsListedSnafu, ProviderResult};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const MODEL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    fn described(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// Models offered when the provider cannot be asked.
pub fn builtin_openai_models() -> Vec<Model> {
    vec![
        Model::described("gpt-4o", "Default for legal analysis"),
        Model::described("gpt-4o-mini", "Faster, cheaper drafts"),
        Model::described("gpt-4.1", "Long-context document review"),
        Model::described("o3", "Extended reasoning"),
    ]
}

/// Where a listing came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    ProviderApi,
    CacheFresh,
    CacheStaleFallback,
    StaticFallback,
}

impl CatalogSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::ProviderApi => "provider",
            Self::CacheFresh => "cache",
            Self::CacheStaleFallback => "stale cache",
            Self::StaticFallback => "built-in list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<Model>,
    pub source: CatalogSource,
    /// Why a fallback source was used.
    pub warning: Option<String>,
}

impl ModelCatalog {
    pub fn new(models: Vec<Model>, source: CatalogSource) -> Self {
        Self {
            models,
            source,
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Reads the ids out of an OpenAI-style `/models` response, sorted and deduplicated.
pub(crate) fn parse_model_list(payload: &str) -> ProviderResult<Vec<Model>> {
    let list: ModelList = serde_json::from_str(payload).context(ModelPayloadParseSnafu {
        stage: "parse-model-response",
    })?;

    let mut ids = list
        .data
        .into_iter()
        .map(|entry| entry.id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>();
    ids.sort();
    ids.dedup();
    ensure!(
        !ids.is_empty(),
        NoModelsListedSnafu {
            stage: "parse-model-response",
        }
    );

    Ok(ids.into_iter().map(Model::new).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHit {
    Fresh(Vec<Model>),
    Stale(Vec<Model>),
}

struct CachedListing {
    models: Vec<Model>,
    stored_at: Instant,
}

/// Last listing per provider id.
pub struct ModelCache {
    listings: RwLock<HashMap<String, CachedListing>>,
    ttl: Duration,
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            listings: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn lookup(&self, provider_id: &str) -> Option<CacheHit> {
        let listings = self.listings.read().await;
        let listing = listings.get(provider_id)?;
        let models = listing.models.clone();
        Some(if listing.stored_at.elapsed() < self.ttl {
            CacheHit::Fresh(models)
        } else {
            CacheHit::Stale(models)
        })
    }

    pub async fn store(&self, provider_id: &str, models: Vec<Model>) {
        self.listings.write().await.insert(
            provider_id.to_string(),
            CachedListing {
                models,
                stored_at: Instant::now(),
            },
        );
    }
}

static SHARED_CACHE: OnceLock<Arc<ModelCache>> = OnceLock::new();

/// Process-wide cache shared by every adapter.
pub fn shared_model_cache() -> Arc<ModelCache> {
    SHARED_CACHE
        .get_or_init(|| Arc::new(ModelCache::new(MODEL_CACHE_TTL)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    fn ids(models: &[Model]) -> Vec<&str> {
        models.iter().map(|model| model.id.as_str()).collect()
    }

    #[test]
    fn pretty_printed_listing_is_parsed() {
        let payload = r#"{
  "object": "list",
  "data": [
    {
      "id": "o3",
      "object": "model",
      "owned_by": "system"
    },
    {
      "id": "gpt-4o",
      "object": "model",
      "owned_by": "system"
    }
  ]
}"#;
        assert_eq!(ids(&parse_model_list(payload).unwrap()), vec!["gpt-4o", "o3"]);
    }

    #[test]
    fn nested_ids_are_not_models() {
        let payload = r#"{"data":[{"id":"gpt-4o","parent":{"id":"not-a-model"}}]}"#;
        assert_eq!(ids(&parse_model_list(payload).unwrap()), vec!["gpt-4o"]);
    }

    #[test]
    fn listing_is_sorted_and_deduplicated() {
        let payload = r#"{"data":[{"id":"o3"},{"id":"gpt-4o"},{"id":"o3"},{"id":" "}]}"#;
        assert_eq!(ids(&parse_model_list(payload).unwrap()), vec!["gpt-4o", "o3"]);
    }

    #[test]
    fn malformed_or_empty_listings_are_errors() {
        assert!(matches!(
            parse_model_list(r#"{"id":"unterminated"#),
            Err(ProviderError::ModelPayloadParse { .. })
        ));
        assert!(matches!(
            parse_model_list(r#"{"object":"list"}"#),
            Err(ProviderError::ModelPayloadParse { .. })
        ));
        assert!(matches!(
            parse_model_list(r#"{"data":[]}"#),
            Err(ProviderError::NoModelsListed { .. })
        ));
    }

    #[tokio::test]
    async fn cache_ages_from_fresh_to_stale() {
        let expired = ModelCache::new(Duration::ZERO);
        expired.store("openai", vec![Model::new("gpt-4o")]).await;
        assert_eq!(
            expired.lookup("openai").await,
            Some(CacheHit::Stale(vec![Model::new("gpt-4o")]))
        );
        assert_eq!(expired.lookup("other").await, None);

        let live = ModelCache::new(MODEL_CACHE_TTL);
        live.store("openai", builtin_openai_models()).await;
        let Some(CacheHit::Fresh(models)) = live.lookup("openai").await else {
            panic!("expected a fresh listing");
        };
        assert!(models.iter().any(|model| model.id == DEFAULT_OPENAI_MODEL));
    }

    #[test]
    fn catalog_labels_and_warnings() {
        let catalog = ModelCatalog::new(Vec::new(), CatalogSource::CacheStaleFallback)
            .with_warning("timeout");
        assert_eq!(catalog.warning.as_deref(), Some("timeout"));
        assert_eq!(catalog.source.label(), "stale cache");
        assert_eq!(
            ModelCatalog::new(Vec::new(), CatalogSource::ProviderApi).warning,
            None
        );
    }
}

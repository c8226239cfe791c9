//! Streaming completion providers for lexchat.
use std::sync::Arc;

mod catalog;
mod provider;
mod rig_adapter;
mod stream;

pub use catalog::{
    CacheHit, CatalogSource, DEFAULT_OPENAI_MODEL, MODEL_CACHE_TTL, Model, ModelCache,
    ModelCatalog, builtin_openai_models, shared_model_cache,
};
pub use provider::{
    BoxFuture, ChatRequest, LlmProvider, ProviderConfig, ProviderError, ProviderResult,
    StreamHandle, Worker,
};
pub use rig_adapter::{RIG_OPENAI_PROVIDER_ID, RigProviderAdapter};
pub use stream::{AnswerStream, StreamEvent, StreamFeed, StreamId, Turn, answer_channel};

/// Builds the provider named by `config.provider_id`; a blank id means OpenAI.
pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    match config.provider_id.as_str() {
        "" | "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;

use super::catalog::ModelCatalog;
use super::stream::{AnswerStream, StreamId, Turn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
/// Future that drives one answer stream; the caller decides where it runs.
pub type Worker = BoxFuture<'static, ()>;
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Connection details for one provider. Blank fields are treated as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        provider_id: &str,
        api_key: &str,
        endpoint: &str,
        model: Option<&str>,
    ) -> Self {
        Self {
            provider_id: provider_id.trim().to_string(),
            api_key: api_key.trim().to_string(),
            endpoint: endpoint.trim().to_string(),
            model: model
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string),
        }
    }
}

/// Everything needed to stream one answer. The last turn is the question.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub stream_id: StreamId,
    pub model_id: String,
    pub turns: Vec<Turn>,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl ChatRequest {
    pub fn new(stream_id: StreamId, model_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            stream_id,
            model_id: model_id.into(),
            turns,
            preamble: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("no API key configured for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("stream {stream_id:?} does not end with a user turn"))]
    MissingQuestion {
        stage: &'static str,
        stream_id: StreamId,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("model listing returned status {status}: {body}"))]
    ModelFetchStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("model listing is not valid JSON on `{stage}`: {source}"))]
    ModelPayloadParse {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("model listing contained no models"))]
    NoModelsListed { stage: &'static str },
    #[snafu(display("completion failed on `{stage}`, {source}"))]
    Completion {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
}

/// What `stream_chat` hands back: the events to read and the worker that produces them.
pub struct StreamHandle {
    pub stream: AnswerStream,
    pub worker: Worker,
}

pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    /// Lists models, falling back to cached or built-in listings when the provider fails.
    fn fetch_models(&self) -> BoxFuture<'_, ProviderResult<ModelCatalog>>;
    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<StreamHandle>;
}

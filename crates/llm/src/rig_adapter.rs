use std::sync::Arc;

use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::http_client::{self, HttpClientExt, NoBody};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};

use super::catalog::{
    CacheHit, CatalogSource, DEFAULT_OPENAI_MODEL, Model, ModelCache, ModelCatalog,
    builtin_openai_models, parse_model_list, shared_model_cache,
};
use super::provider::{
    BoxFuture, ChatRequest, CompletionSnafu, HttpClientSnafu, LlmProvider, MissingApiKeySnafu,
    MissingQuestionSnafu, ModelFetchStatusSnafu, ProviderConfig, ProviderError, ProviderResult,
    StreamHandle,
};
use super::stream::{StreamEvent, StreamFeed, Turn, answer_channel};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// OpenAI-compatible provider backed by rig's streaming completion client.
pub struct RigProviderAdapter {
    config: ProviderConfig,
    model_cache: Arc<ModelCache>,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        Self::with_cache(config, shared_model_cache())
    }

    pub fn with_cache(
        config: ProviderConfig,
        model_cache: Arc<ModelCache>,
    ) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self {
            config,
            model_cache,
        })
    }

    fn client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    async fn list_remote_models(&self) -> ProviderResult<Vec<Model>> {
        let client = Self::client(&self.config)?;
        let request = client
            .get("/models")
            .and_then(|builder| builder.body(NoBody).map_err(http_client::Error::from))
            .context(HttpClientSnafu {
                stage: "build-model-request",
            })?;

        let response = client.send(request).await.context(HttpClientSnafu {
            stage: "send-model-request",
        })?;
        let status = response.status();
        let payload = http_client::text(response).await.context(HttpClientSnafu {
            stage: "read-model-response",
        })?;

        ensure!(
            status.is_success(),
            ModelFetchStatusSnafu {
                stage: "model-http-status",
                status: status.as_u16(),
                body: payload,
            }
        );
        parse_model_list(&payload)
    }

    async fn open_stream(
        config: &ProviderConfig,
        request: &ChatRequest,
    ) -> ProviderResult<RigStreamingResponse> {
        let Some((Turn::User(question), history)) = request.turns.split_last() else {
            return MissingQuestionSnafu {
                stage: "open-stream",
                stream_id: request.stream_id,
            }
            .fail();
        };

        let client = Self::client(config)?;
        let mut builder = client
            .completion_model(request.model_id.clone())
            .completion_request(RigMessage::user(question.clone()))
            .messages(history.iter().map(rig_message).collect())
            .temperature_opt(request.temperature)
            .max_tokens_opt(request.max_tokens);
        if let Some(preamble) = request.preamble.as_deref().map(str::trim)
            && !preamble.is_empty()
        {
            builder = builder.preamble(preamble.to_string());
        }

        builder.stream().await.context(CompletionSnafu {
            stage: "open-stream",
        })
    }

    async fn run_stream_worker(config: ProviderConfig, request: ChatRequest, feed: StreamFeed) {
        let stream_id = request.stream_id;
        let StreamFeed { events, mut cancel } = feed;
        let emit = |event: StreamEvent| events.send(event).is_ok();

        let mut stream = match Self::open_stream(&config, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    stream_id = ?stream_id,
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                emit(StreamEvent::Failed(error.to_string()));
                return;
            }
        };
        tracing::debug!(
            stream_id = ?stream_id,
            model_id = %request.model_id,
            "provider stream opened"
        );

        loop {
            tokio::select! {
                _ = &mut cancel => {
                    tracing::debug!(stream_id = ?stream_id, "provider stream cancelled");
                    stream.cancel();
                    return;
                }
                item = stream.next() => match item {
                    Some(Ok(content)) => {
                        if let Some(event) = stream_event(content)
                            && !emit(event)
                        {
                            stream.cancel();
                            return;
                        }
                    }
                    Some(Err(source)) => {
                        tracing::warn!(
                            stream_id = ?stream_id,
                            error = %source,
                            "provider stream failed"
                        );
                        let error = ProviderError::Completion {
                            stage: "stream-chunk",
                            source,
                        };
                        emit(StreamEvent::Failed(error.to_string()));
                        return;
                    }
                    None => break,
                },
            }
        }

        tracing::debug!(stream_id = ?stream_id, "provider stream finished");
        emit(StreamEvent::Done);
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "OpenAI (rig)"
    }

    fn default_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    /// Fresh cache, then the provider, then a stale cache entry, then the built-in list.
    fn fetch_models(&self) -> BoxFuture<'_, ProviderResult<ModelCatalog>> {
        Box::pin(async move {
            let cached = self.model_cache.lookup(self.id()).await;
            if let Some(CacheHit::Fresh(models)) = cached {
                return Ok(ModelCatalog::new(models, CatalogSource::CacheFresh));
            }

            let error = match self.list_remote_models().await {
                Ok(models) => {
                    self.model_cache.store(self.id(), models.clone()).await;
                    return Ok(ModelCatalog::new(models, CatalogSource::ProviderApi));
                }
                Err(error) => error.to_string(),
            };

            let catalog = match cached {
                Some(CacheHit::Stale(models)) => {
                    ModelCatalog::new(models, CatalogSource::CacheStaleFallback)
                }
                _ => ModelCatalog::new(builtin_openai_models(), CatalogSource::StaticFallback),
            };
            tracing::warn!(
                provider_id = %self.id(),
                source = catalog.source.label(),
                model_count = catalog.models.len(),
                error = %error,
                "model listing failed; using fallback"
            );
            Ok(catalog.with_warning(error))
        })
    }

    fn stream_chat(&self, request: ChatRequest) -> ProviderResult<StreamHandle> {
        ensure!(
            matches!(request.turns.last(), Some(Turn::User(_))),
            MissingQuestionSnafu {
                stage: "stream-chat",
                stream_id: request.stream_id,
            }
        );

        let (feed, stream) = answer_channel(request.stream_id);
        let worker = Box::pin(Self::run_stream_worker(self.config.clone(), request, feed));
        Ok(StreamHandle { stream, worker })
    }
}

fn rig_message(turn: &Turn) -> RigMessage {
    match turn {
        Turn::User(text) => RigMessage::user(text.clone()),
        Turn::Assistant(text) => RigMessage::assistant(text.clone()),
    }
}

fn stream_event<R>(content: StreamedAssistantContent<R>) -> Option<StreamEvent>
where
    R: Clone + Unpin,
{
    let event = match content {
        StreamedAssistantContent::Text(text) => StreamEvent::Fragment(text.text),
        StreamedAssistantContent::Reasoning(reasoning) => {
            StreamEvent::Reasoning(reasoning.reasoning.concat())
        }
        StreamedAssistantContent::ReasoningDelta { reasoning, .. } => {
            StreamEvent::Reasoning(reasoning)
        }
        StreamedAssistantContent::ToolCall { .. }
        | StreamedAssistantContent::ToolCallDelta { .. }
        | StreamedAssistantContent::Final(_) => return None,
    };

    let empty = matches!(
        &event,
        StreamEvent::Fragment(text) | StreamEvent::Reasoning(text) if text.is_empty()
    );
    (!empty).then_some(event)
}

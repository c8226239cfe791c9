use std::future::Future;
use std::sync::Arc;

use lexchat_llm::{ChatRequest, LlmProvider, ProviderError, StreamEvent, StreamHandle, StreamId};
use snafu::{ResultExt, Snafu, ensure};
use tokio::sync::Mutex;

use super::message::{
    ChatMessage, ChatRole, Conversation, MessageId, MessageStatus, StreamState, StreamTransition,
};
use super::segmenter::{DEFAULT_REASONING_WINDOW, Phase, StreamSegmenter};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("prompt is empty"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("provider failed on `{stage}`, {source}"))]
    Provider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("response stream failed: {message}"))]
    StreamFailed {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("response stream closed before completion"))]
    StreamClosed { stage: &'static str },
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Receives the assistant's display text after every fragment.
pub trait DisplaySink {
    fn on_display(&mut self, display: &str, messages: &[ChatMessage]);
}

impl<F> DisplaySink for F
where
    F: FnMut(&str, &[ChatMessage]),
{
    fn on_display(&mut self, display: &str, messages: &[ChatMessage]) {
        self(display, messages)
    }
}

/// Request parameters applied to every send.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model_id: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub reasoning_window: usize,
}

impl SessionOptions {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            preamble: None,
            temperature: None,
            max_tokens: None,
            reasoning_window: DEFAULT_REASONING_WINDOW,
        }
    }
}

/// How a send ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Completed {
        message_id: MessageId,
        phase: Phase,
        content: String,
    },
    /// The abort future fired; partial content is kept unless nothing arrived yet.
    Cancelled {
        message_id: Option<MessageId>,
        content: String,
    },
    /// Another send was still streaming, nothing was changed.
    Busy,
}

/// One conversation with a provider, streaming one answer at a time.
pub struct ChatSession {
    provider: Arc<dyn LlmProvider>,
    options: SessionOptions,
    conversation: Mutex<Conversation>,
}

impl ChatSession {
    pub fn new(provider: Arc<dyn LlmProvider>, options: SessionOptions) -> Self {
        Self {
            provider,
            options,
            conversation: Mutex::new(Conversation::default()),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.lock().await.messages.clone()
    }

    pub async fn stream_state(&self) -> StreamState {
        self.conversation.lock().await.stream_state.clone()
    }

    /// Sends `prompt` and streams the answer into `sink` until completion, failure or abort.
    ///
    /// A call made while another send is streaming returns [`SendOutcome::Busy`]. On failure
    /// the assistant placeholder is removed and the user's turn stays in history.
    pub async fn send_message<S, A>(
        &self,
        prompt: &str,
        sink: &mut S,
        abort: A,
    ) -> ChatResult<SendOutcome>
    where
        S: DisplaySink + ?Sized,
        A: Future<Output = ()>,
    {
        let prompt = prompt.trim();
        ensure!(!prompt.is_empty(), EmptyPromptSnafu { stage: "send-message" });

        let Some((stream_id, placeholder, request)) = self.begin(prompt).await else {
            return Ok(SendOutcome::Busy);
        };

        let StreamHandle { mut stream, worker } = match self.provider.stream_chat(request) {
            Ok(handle) => handle,
            Err(source) => {
                self.fail(stream_id, placeholder, source.to_string()).await;
                return Err(source).context(ProviderSnafu {
                    stage: "open-provider-stream",
                });
            }
        };
        tokio::spawn(worker);

        let mut segmenter = StreamSegmenter::new(self.options.reasoning_window);
        tokio::pin!(abort);

        loop {
            let event = tokio::select! {
                _ = &mut abort => {
                    stream.cancel();
                    return Ok(self.cancel(stream_id, placeholder).await);
                }
                event = stream.next_event() => event,
            };

            let Some(event) = event else {
                let message = "provider worker exited without a terminal event".to_string();
                self.fail(stream_id, placeholder, message).await;
                return StreamClosedSnafu {
                    stage: "receive-stream-event",
                }
                .fail();
            };

            match event {
                StreamEvent::Fragment(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    let display = segmenter.push(&fragment);
                    let mut conversation = self.conversation.lock().await;
                    if let Some(message) = conversation.message_mut(placeholder) {
                        message.content.clear();
                        message.content.push_str(display);
                    }
                    sink.on_display(display, &conversation.messages);
                }
                StreamEvent::Reasoning(reasoning) => {
                    tracing::trace!(
                        stream_id = ?stream_id,
                        len = reasoning.len(),
                        "skipping out-of-band reasoning"
                    );
                }
                StreamEvent::Done => {
                    return Ok(self.complete(stream_id, placeholder, &segmenter).await);
                }
                StreamEvent::Failed(message) => {
                    self.fail(stream_id, placeholder, message.clone()).await;
                    return StreamFailedSnafu {
                        stage: "stream-event",
                        message,
                    }
                    .fail();
                }
            }
        }
    }

    /// Claims the stream slot and appends the user turn plus an empty assistant placeholder.
    async fn begin(&self, prompt: &str) -> Option<(StreamId, MessageId, ChatRequest)> {
        let mut conversation = self.conversation.lock().await;
        let stream_id = conversation.next_stream_id();
        if let Err(rejection) =
            conversation.apply_stream_transition(StreamTransition::Start(stream_id))
        {
            tracing::debug!(?rejection, "send ignored while another answer is streaming");
            return None;
        }

        conversation.push(ChatRole::User, prompt, MessageStatus::Done);
        let turns = conversation.turns();
        let placeholder = conversation.push(
            ChatRole::Assistant,
            String::new(),
            MessageStatus::Streaming(stream_id),
        );

        let request = ChatRequest {
            preamble: self.options.preamble.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            ..ChatRequest::new(stream_id, self.options.model_id.clone(), turns)
        };

        tracing::debug!(
            stream_id = ?stream_id,
            model_id = %self.options.model_id,
            turns = request.turns.len(),
            "starting answer stream"
        );
        Some((stream_id, placeholder, request))
    }

    async fn complete(
        &self,
        stream_id: StreamId,
        placeholder: MessageId,
        segmenter: &StreamSegmenter,
    ) -> SendOutcome {
        let mut conversation = self.conversation.lock().await;
        if let Some(message) = conversation.message_mut(placeholder) {
            message.status = MessageStatus::Done;
        }
        self.finish(&mut conversation, StreamTransition::Complete(stream_id));
        tracing::debug!(
            stream_id = ?stream_id,
            phase = ?segmenter.phase(),
            raw_len = segmenter.raw().len(),
            "answer stream completed"
        );

        SendOutcome::Completed {
            message_id: placeholder,
            phase: segmenter.phase(),
            content: segmenter.display().to_string(),
        }
    }

    async fn cancel(&self, stream_id: StreamId, placeholder: MessageId) -> SendOutcome {
        let mut conversation = self.conversation.lock().await;
        let content = conversation
            .message_mut(placeholder)
            .map(|message| {
                message.status = MessageStatus::Cancelled;
                message.content.clone()
            })
            .unwrap_or_default();

        let message_id = if content.is_empty() {
            conversation.remove(placeholder);
            None
        } else {
            Some(placeholder)
        };
        self.finish(&mut conversation, StreamTransition::Cancel(stream_id));
        tracing::debug!(
            stream_id = ?stream_id,
            kept = message_id.is_some(),
            "answer stream cancelled"
        );

        SendOutcome::Cancelled {
            message_id,
            content,
        }
    }

    async fn fail(&self, stream_id: StreamId, placeholder: MessageId, message: String) {
        let mut conversation = self.conversation.lock().await;
        conversation.remove(placeholder);
        tracing::warn!(stream_id = ?stream_id, error = %message, "answer stream failed");
        let transition = StreamTransition::Fail {
            stream: stream_id,
            message,
        };
        self.finish(&mut conversation, transition);
    }

    fn finish(&self, conversation: &mut Conversation, transition: StreamTransition) {
        if let Err(rejection) = conversation.apply_stream_transition(transition) {
            tracing::warn!(?rejection, "stream transition rejected");
        }
    }
}

//! Channel pair between a provider worker and the code rendering its answer.
use tokio::sync::{mpsc, oneshot};

/// Identifies one answer stream. Each send allocates the next id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub const FIRST: Self = Self(1);

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// One turn of conversation history. Instructions travel as the request preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    Assistant(String),
}

impl Turn {
    pub fn text(&self) -> &str {
        match self {
            Self::User(text) | Self::Assistant(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Answer text, in arrival order.
    Fragment(String),
    /// Reasoning the provider reports outside the answer text.
    Reasoning(String),
    Done,
    Failed(String),
}

/// Worker half: where events go and how cancellation arrives.
pub struct StreamFeed {
    pub events: mpsc::UnboundedSender<StreamEvent>,
    pub cancel: oneshot::Receiver<()>,
}

/// Consumer half of one answer stream. Dropping it cancels the worker.
pub struct AnswerStream {
    id: StreamId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl AnswerStream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Next event, or None once the worker has gone away.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Asks the worker to stop. Returns false if it was already asked or is gone.
    pub fn cancel(&mut self) -> bool {
        self.cancel
            .take()
            .is_some_and(|cancel| cancel.send(()).is_ok())
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub fn answer_channel(id: StreamId) -> (StreamFeed, AnswerStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        StreamFeed {
            events: event_tx,
            cancel: cancel_rx,
        },
        AnswerStream {
            id,
            events: event_rx,
            cancel: Some(cancel_tx),
        },
    )
}

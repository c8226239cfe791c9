use lexchat_llm::{StreamId, Turn};

/// Stable identifier for one message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    Streaming(StreamId),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: ChatRole,
    pub content: String,
    pub status: MessageStatus,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        role: ChatRole,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            status,
        }
    }

    pub fn to_turn(&self) -> Turn {
        match self.role {
            ChatRole::User => Turn::User(self.content.clone()),
            ChatRole::Assistant => Turn::Assistant(self.content.clone()),
        }
    }
}

/// Ordered chat history plus the state of its single in-flight stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub stream_state: StreamState,
    next_message_id: u64,
    next_stream_id: StreamId,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            stream_state: StreamState::Idle,
            next_message_id: 1,
            next_stream_id: StreamId::FIRST,
        }
    }
}

impl Conversation {
    /// Every send gets its own stream id, so late transitions from an older stream are rejected.
    pub fn next_stream_id(&mut self) -> StreamId {
        let id = self.next_stream_id;
        self.next_stream_id = id.next();
        id
    }

    pub fn push(
        &mut self,
        role: ChatRole,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        self.messages.push(ChatMessage::new(id, role, content, status));
        id
    }

    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    pub fn remove(&mut self, id: MessageId) -> Option<ChatMessage> {
        let index = self.messages.iter().position(|message| message.id == id)?;
        Some(self.messages.remove(index))
    }

    /// History sent to the provider; the streaming placeholder is excluded.
    pub fn turns(&self) -> Vec<Turn> {
        self.messages
            .iter()
            .filter(|message| !matches!(message.status, MessageStatus::Streaming(_)))
            .filter(|message| !message.content.is_empty())
            .map(ChatMessage::to_turn)
            .collect()
    }

    pub fn apply_stream_transition(
        &mut self,
        transition: StreamTransition,
    ) -> StreamTransitionResult {
        let next_state = self.stream_state.apply(transition)?;
        self.stream_state = next_state.clone();
        Ok(next_state)
    }
}

/// Stream lifecycle for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamId),
    Done(StreamId),
    Error {
        stream: StreamId,
        message: String,
    },
    Cancelled(StreamId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamId),
    Complete(StreamId),
    Fail {
        stream: StreamId,
        message: String,
    },
    Cancel(StreamId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming {
        active: StreamId,
        attempted: StreamId,
    },
    NoActiveStream,
    StreamMismatch {
        active: StreamId,
        attempted: StreamId,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn active_stream(&self) -> Option<StreamId> {
        match self {
            Self::Streaming(stream) => Some(*stream),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active_stream().is_some()
    }

    /// Any non-streaming state may start; terminal transitions must name the active stream.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(stream) => match self {
                Self::Streaming(active) => Err(StreamTransitionRejection::AlreadyStreaming {
                    active: *active,
                    attempted: stream,
                }),
                _ => Ok(Self::Streaming(stream)),
            },
            StreamTransition::Complete(stream) => self.finish(stream, Self::Done(stream)),
            StreamTransition::Fail { stream, message } => {
                self.finish(stream, Self::Error { stream, message })
            }
            StreamTransition::Cancel(stream) => self.finish(stream, Self::Cancelled(stream)),
        }
    }

    fn finish(&self, stream: StreamId, next: Self) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == stream => Ok(next),
            Self::Streaming(active) => Err(StreamTransitionRejection::StreamMismatch {
                active: *active,
                attempted: stream,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::default()
    }

    #[test]
    fn second_start_is_rejected_while_streaming() {
        let mut conversation = conversation();
        let first = conversation.next_stream_id();
        let second = conversation.next_stream_id();
        assert_ne!(first, second);

        conversation
            .apply_stream_transition(StreamTransition::Start(first))
            .unwrap();
        assert_eq!(
            conversation.apply_stream_transition(StreamTransition::Start(second)),
            Err(StreamTransitionRejection::AlreadyStreaming {
                active: first,
                attempted: second,
            })
        );
        assert_eq!(conversation.stream_state.active_stream(), Some(first));
    }

    #[test]
    fn terminal_transitions_require_matching_stream() {
        let mut conversation = conversation();
        let first = conversation.next_stream_id();
        let stale = conversation.next_stream_id();
        conversation
            .apply_stream_transition(StreamTransition::Start(first))
            .unwrap();

        assert!(matches!(
            conversation.apply_stream_transition(StreamTransition::Complete(stale)),
            Err(StreamTransitionRejection::StreamMismatch { .. })
        ));
        assert_eq!(
            conversation.apply_stream_transition(StreamTransition::Cancel(first)),
            Ok(StreamState::Cancelled(first))
        );
        assert_eq!(
            conversation.apply_stream_transition(StreamTransition::Complete(first)),
            Err(StreamTransitionRejection::NoActiveStream)
        );

        let retry = conversation.next_stream_id();
        assert_eq!(
            conversation.apply_stream_transition(StreamTransition::Start(retry)),
            Ok(StreamState::Streaming(retry))
        );
    }

    #[test]
    fn provider_history_skips_placeholder() {
        let mut conversation = conversation();
        let stream = conversation.next_stream_id();
        conversation.push(ChatRole::User, "¿Es válido el contrato?", MessageStatus::Done);
        let placeholder = conversation.push(
            ChatRole::Assistant,
            "",
            MessageStatus::Streaming(stream),
        );

        assert_eq!(
            conversation.turns(),
            vec![Turn::User("¿Es válido el contrato?".to_string())]
        );

        assert!(conversation.remove(placeholder).is_some());
        assert!(conversation.remove(placeholder).is_none());
        assert_eq!(conversation.messages.len(), 1);
    }
}

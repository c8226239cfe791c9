//! Chat domain: conversation state, answer segmentation and the streaming session.
pub mod markers;
pub mod message;
pub mod segmenter;
pub mod session;

pub use markers::{MarkerKind, MarkerMatch, find_transition};
pub use message::{
    ChatMessage, ChatRole, Conversation, MessageId, MessageStatus, StreamState, StreamTransition,
    StreamTransitionRejection, StreamTransitionResult,
};
pub use segmenter::{
    DEFAULT_REASONING_WINDOW, PARAGRAPH_DELIMITER, Phase, REASONING_HEADER, REASONING_TOKEN,
    StreamSegmenter, shape_reasoning,
};
pub use session::{ChatError, ChatResult, ChatSession, DisplaySink, SendOutcome, SessionOptions};

#![deny(unsafe_code)]

/// Chat domain: conversation state, answer segmentation and streaming sessions.
pub mod chat;
/// Command-line front end.
pub mod cli;
/// Settings persistence.
pub mod settings;

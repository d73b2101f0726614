//! Stateless parsers from raw platform payloads to typed events.
//!
//! Every parser returns `None` (or skips the entry) on malformed input and
//! never errors; upstream data is noisy and a bad frame must not stop ingestion.

pub mod chat;
pub mod tip;
pub mod viewer;

pub use chat::parse_chat;
pub use tip::parse_tip;
pub use viewer::parse_viewer_list;

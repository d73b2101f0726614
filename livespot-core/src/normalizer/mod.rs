//! Validation and canonicalisation between the parsers and storage.

pub mod message;
pub mod session;
pub mod viewer;

pub use message::{normalize_message, RawMessage};
pub use session::{normalize_session, RawSession};
pub use viewer::normalize_viewers;

/// User names that never identify a real viewer (compared case-insensitively).
pub const REJECTED_USER_NAMES: &[&str] = &["unknown", "undefined", "null", ""];

pub fn is_rejected_user_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    REJECTED_USER_NAMES.contains(&lower.as_str())
}

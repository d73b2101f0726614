// ================================================================
// File: livespot-common/src/error.rs
// ================================================================

use thiserror::Error;

/// Guardrail rejections raised by the outreach safety gate.
///
/// These are never retried. Operators see them in the queue's error column
/// under the stable code returned by [`SafetyViolation::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("CAMPAIGN_REQUIRED: outreach without a campaign tag is not allowed")]
    CampaignRequired,

    #[error("TEST_MODE_BLOCKED: {user_name} is not whitelisted while test mode is on")]
    TestModeBlocked { user_name: String },

    #[error("CAST_IDENTITY_MISMATCH: session user {actual} does not own cast {cast_name} (expected {expected})")]
    IdentityMismatch {
        cast_name: String,
        expected: String,
        actual: String,
    },
}

impl SafetyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            SafetyViolation::CampaignRequired => "CAMPAIGN_REQUIRED",
            SafetyViolation::TestModeBlocked { .. } => "TEST_MODE_BLOCKED",
            SafetyViolation::IdentityMismatch { .. } => "CAST_IDENTITY_MISMATCH",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The platform rejected our session cookie (HTTP 401/403).
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Safety gate rejected send: {0}")]
    Safety(#[from] SafetyViolation),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Event bus error: {0}")]
    EventBus(String),
}

impl Error {
    /// Network-level failures that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Http(_) | Error::Io(_) | Error::WebSocket(_) | Error::Timeout(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}

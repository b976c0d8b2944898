use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport failures from either external service (registry or hosting
/// platform). These are carried verbatim through record states and shown on
/// the operator console; they are never promoted to a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("bad url: {0}")]
    BadUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("bad status: {0}")]
    BadStatus(u16),
    #[error("bad body: {0}")]
    BadBody(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BadStatus(404))
    }
}

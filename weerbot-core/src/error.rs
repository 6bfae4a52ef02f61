//! Error types for the individual pipeline components.
//!
//! Fetch failures do not leave their component as errors: the weather fetcher
//! turns them into an [`ErrorPayload`](crate::model::ErrorPayload) and the UV
//! fetcher into a [`UvOutcome`](crate::uv::UvOutcome). The types here describe
//! a single failed attempt and the side-channel failures.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::model::ChatId;

/// A single failed request to one of the data APIs.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response contained no data")]
    Empty,

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to write snapshot {path}: {source}")]
    Store {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("could not start transfer command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{0}")]
    Output(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram rejected message to {chat}: {description}")]
    Rejected { chat: ChatId, description: String },

    #[error("telegram API error: {description}")]
    Api { description: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to read recipient list {path}: {source}")]
    Recipients {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("forbidden"), "forbidden");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }

    #[test]
    fn status_is_exposed_for_status_errors() {
        let err = FetchError::Status {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(FetchError::Empty.status(), None);
    }
}

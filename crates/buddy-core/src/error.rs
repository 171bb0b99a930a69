//! Error types for Budget Buddy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A collaborator (hosted store or LLM) timed out or dropped the request
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// A collaborator refused the connection; the request never left this process
    #[error("{service} unreachable: {reason}")]
    Unreachable { service: String, reason: String },

    /// A collaborator answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid expense: {0}")]
    Validation(String),

    #[error("Nothing to work with: {0}")]
    EmptyInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Map a reqwest failure into the collaborator taxonomy
    pub fn from_http(service: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Error::Upstream {
                service: service.to_string(),
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return Error::InvalidData(format!("{} sent an unreadable response: {}", service, err));
        }
        if err.is_connect() {
            Error::Unreachable {
                service: service.to_string(),
                reason: err.to_string(),
            }
        } else {
            Error::Unavailable {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the failure is worth a retry (network trouble, 5xx, 429)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable { .. } | Error::Unreachable { .. } => true,
            Error::Upstream { status, .. } => *status == 429 || *status >= 500,
            Error::Pool(_) => true,
            _ => false,
        }
    }

    /// Whether the request provably never reached the collaborator
    pub fn never_reached(&self) -> bool {
        matches!(self, Error::Unreachable { .. })
    }

    /// Whether a collaborator is the cause (as opposed to bad input)
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Error::Unavailable { .. }
                | Error::Unreachable { .. }
                | Error::Upstream { .. }
                | Error::Database(_)
                | Error::Pool(_)
                | Error::Encryption(_)
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turn a non-2xx response into `Error::Upstream`, keeping the body for the log
pub(crate) async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream {
        service: service.to_string(),
        status,
        body,
    })
}

use kynhood_core::error::codes;
use serde_json::Value;
use thiserror::Error;

/// Failure talking to the upstream API: either a non-2xx status or a
/// transport error (DNS, refused connection, timeout) with no status.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    pub message: String,
    pub status: Option<u16>,
    /// Parsed response body, `Value::Null` for transport failures
    pub body: Value,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl HttpError {
    pub(crate) fn status(status: reqwest::StatusCode, body: Value) -> Self {
        Self {
            message: format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ),
            status: Some(status.as_u16()),
            body,
            source: None,
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self {
            message: format!("Request failed: {err}"),
            status: None,
            body: Value::Null,
            source: Some(err),
        }
    }

    pub(crate) fn invalid_url(url: &str, err: url::ParseError) -> Self {
        Self {
            message: format!("Request failed: invalid URL '{url}': {err}"),
            status: None,
            body: Value::Null,
            source: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("Token not found in response")]
    MissingToken,
    #[error(transparent)]
    Upstream(#[from] HttpError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Failed to obtain guest token: {0}")]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("{0}")]
    NotFound(String),
    /// Uniform wrapper naming the operation that failed.
    #[error("{operation}: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn within(self, operation: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The underlying failure with all `Operation` wrappers removed.
    pub fn root(&self) -> &ApiError {
        let mut current = self;
        while let ApiError::Operation { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => codes::VALIDATION_FAILED,
            ApiError::Authentication(_) => codes::AUTHENTICATION_FAILED,
            ApiError::Http(err) if err.status.is_none() => codes::CONNECTION_ERROR,
            ApiError::Http(_) => codes::UPSTREAM_HTTP_ERROR,
            ApiError::NotFound(_) => codes::NOT_FOUND,
            ApiError::Operation { source, .. } => source.code(),
        }
    }

    /// False only when no response came back at all (DNS, refused
    /// connection, timeout).
    pub fn reached_upstream(&self) -> bool {
        match self.root() {
            ApiError::Http(err) | ApiError::Authentication(AuthenticationError::Upstream(err)) => {
                err.status.is_some()
            }
            _ => true,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self.root() {
            ApiError::Http(err) => err.status,
            ApiError::Authentication(AuthenticationError::Upstream(err)) => err.status,
            _ => None,
        }
    }
}

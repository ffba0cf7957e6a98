use crate::response::Response;
use axum::http::StatusCode;

/// Errors raised while routes are being registered. These are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate handler for {method} {path}")]
    DuplicateHandler { method: String, path: String },

    #[error("invalid pattern in segment '{segment}': {source}")]
    InvalidPattern {
        segment: String,
        #[source]
        source: regex::Error,
    },

    #[error("unterminated capture in segment '{segment}'")]
    UnterminatedCapture { segment: String },

    #[error("capture in segment '{segment}' has no name")]
    UnnamedCapture { segment: String },

    #[error("wildcard segment '{segment}' cannot carry capture syntax")]
    WildcardCapture { segment: String },

    #[error("invalid group route '{route}'")]
    InvalidGroup { route: String },

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    #[error("invalid status code {0}")]
    InvalidStatus(u16),
}

/// Per-request failures. Every variant resolves to a best-effort response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("not found")]
    NotFound,

    #[error("method not supported")]
    MethodNotSupported,

    #[error("unexpected error: {0}")]
    Internal(String),

    #[error("content length not specified")]
    LengthRequired,

    #[error("content length too large")]
    PayloadTooLarge,

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NotFound => StatusCode::NOT_FOUND,
            DispatchError::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            DispatchError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The fixed plain-text response sent to the client.
    pub fn to_response(&self) -> Response {
        let body = match self {
            DispatchError::NotFound => "Not Found",
            DispatchError::MethodNotSupported => "Method not supported",
            DispatchError::Internal(_) => "Unexpected Error",
            DispatchError::LengthRequired => "content length not specified",
            DispatchError::PayloadTooLarge => "content length too large",
            DispatchError::InvalidRequestBody(_) => "Invalid Request Body",
        };

        Response::text(body).with_status(self.status())
    }

    /// Label used for the dispatch outcome metric.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            DispatchError::NotFound => "not_found",
            DispatchError::MethodNotSupported => "method_not_supported",
            DispatchError::Internal(_) => "internal",
            DispatchError::LengthRequired => "length_required",
            DispatchError::PayloadTooLarge => "payload_too_large",
            DispatchError::InvalidRequestBody(_) => "invalid_body",
        }
    }
}

/// Failures of the lazily parsed body view.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body is empty")]
    Empty,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML body: {0}")]
    Xml(String),

    #[error("JSON body must be an object")]
    NotAnObject,

    #[error("invalid multipart body: {0}")]
    Multipart(String),

    #[error("failed to stage uploaded file: {0}")]
    Staging(#[from] std::io::Error),
}

/// A response body that does not fit its declared kind, or failed to encode.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("{kind} response cannot carry a {body} body")]
    Mismatch { kind: &'static str, body: &'static str },

    #[error("failed to encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode XML body: {0}")]
    Xml(String),

    #[error("invalid redirect target: {0}")]
    InvalidRedirect(String),
}

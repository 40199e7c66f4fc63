use reqwest::{Method, StatusCode};

#[derive(thiserror::Error, Debug)]
pub enum SensuError {
    #[error("HTTP client error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("could not decode backend object: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },
}

impl SensuError {
    pub fn is_not_found(&self) -> bool {
        match self {
            SensuError::NotFound { .. } => true,
            SensuError::Status { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("error listing namespaces: {0}")]
    Namespaces(#[source] SensuError),
    #[error("error creating namespace {namespace}: {source}")]
    NamespaceBootstrap {
        namespace: String,
        source: SensuError,
    },
    #[error("backend error: {0}")]
    Backend(#[from] SensuError),
}

impl ReconcileError {
    /// Whether the failure concerns the backend as a whole rather than one namespace.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::Namespaces(_) | ReconcileError::NamespaceBootstrap { .. }
        )
    }
}

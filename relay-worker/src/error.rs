use http::StatusCode;
use relay_common::delivery::{DeliveryResult, Reason};
use relay_common::store::StoreError;
use thiserror::Error;

/// Failures below HTTP: no response was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request could not be built, e.g. a malformed URL, or it ran into a redirect
    /// loop. Retrying cannot help.
    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

impl From<&reqwest::Error> for TransportError {
    fn from(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else if error.is_builder() || error.is_redirect() {
            TransportError::Request(error.to_string())
        } else {
            TransportError::Connection(error.to_string())
        }
    }
}

/// Why a single send did not deliver. Always surfaced to callers as a `DeliveryResult`.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("payload failed validation: {0}")]
    Validation(String),
    #[error("webhook URL is not configured")]
    MissingWebhookUrl,
    #[error("send vetoed by consent check: {0}")]
    ConsentDenied(String),
    #[error("webhook endpoint is rate limiting requests: {body}")]
    RateLimited { body: String },
    #[error("webhook endpoint returned {status}: {body}")]
    ServerError { status: StatusCode, body: String },
    #[error("webhook endpoint rejected the payload with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliveryError {
    /// The reason reported to callers. Retryable errors only reach callers once every
    /// attempt has been used.
    pub fn reason(&self) -> Reason {
        match self {
            DeliveryError::Validation(_) => Reason::ValidationError,
            DeliveryError::MissingWebhookUrl => Reason::ConfigurationError,
            DeliveryError::ConsentDenied(_) => Reason::ConsentDenied,
            DeliveryError::RateLimited { .. } | DeliveryError::ServerError { .. } => {
                Reason::RetriesExhausted
            }
            DeliveryError::Transport(e) if e.is_retryable() => Reason::RetriesExhausted,
            DeliveryError::Rejected { .. }
            | DeliveryError::Transport(_)
            | DeliveryError::Serialization(_) => Reason::TerminalTransportError,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DeliveryError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            DeliveryError::ServerError { status, .. } | DeliveryError::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn into_result(self, attempts: u32) -> DeliveryResult {
        DeliveryResult::failed(self.reason(), self.to_string(), attempts)
            .with_response_code(self.status().map(|status| status.as_u16()))
    }
}

/// Errors setting up a `DeliveryEngine`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to build http client")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to connect to idempotency store")]
    Store(#[from] StoreError),
}

/// Errors reading payloads from newline-delimited JSON input.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read input")]
    Io(#[from] std::io::Error),
    #[error("line {line} is not a JSON object: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

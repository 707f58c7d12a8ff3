use thiserror::Error;

/// Request-shape problems detected before dispatch. Reported locally with a
/// 400; never reach a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `jsonrpc` field is missing or not "2.0".
    #[error("invalid request: jsonrpc must be 2.0, got {0:?}")]
    InvalidVersion(String),

    /// `method` field is missing or empty.
    #[error("invalid request: method is required")]
    MissingMethod,
}

/// Terminal dispatch failures surfaced to the ingress layer.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Request failed validation before any provider was contacted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No untried, selectable provider remained before any attempt succeeded.
    #[error("no untried provider available")]
    NoProviders,

    /// Every retry attempt failed; carries the last transport error observed.
    #[error("max retries exceeded, last error: {last_error}")]
    Exhausted { last_error: String },
}

impl DispatchError {
    /// JSON-RPC error code for the client-facing envelope.
    #[must_use]
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            Self::Validation(_) => -32600,
            Self::NoProviders | Self::Exhausted { .. } => -32603,
        }
    }
}

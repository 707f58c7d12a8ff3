use thiserror::Error;

/// Errors that can occur when forwarding to an upstream RPC provider.
///
/// All variants represent transport-level failures. A well-formed JSON-RPC
/// response whose `error` field is set is *not* an `UpstreamError`: the
/// dispatch engine returns it to the client as a success and never retries it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the configured timeout duration.
    #[error("request timeout")]
    Timeout,

    /// Failed to establish a connection to the upstream endpoint.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// HTTP-level error occurred (non-2xx status code).
    ///
    /// First field is the HTTP status code, second is a truncated body fragment.
    #[error("provider returned HTTP {0}: {1}")]
    HttpError(u16, String),

    /// Response from upstream could not be parsed as a JSON-RPC response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be serialized before sending.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Circuit breaker is open, blocking requests to protect the upstream.
    #[error("circuit breaker is open")]
    CircuitBreakerOpen,

    /// Operator override forces this provider to be skipped.
    #[error("provider forced open by operator override")]
    ForcedOpen,

    /// No selectable provider remains for this request.
    #[error("no providers available")]
    NoProvidersAvailable,

    /// Maximum concurrent outbound requests reached.
    #[error("concurrency limit reached")]
    ConcurrencyLimit,
}

impl UpstreamError {
    /// Returns `true` for failures that should feed the provider's circuit
    /// breaker.
    ///
    /// Breaker-open and forced-open are gate decisions, not observations about
    /// the upstream, and selection exhaustion says nothing about any single
    /// provider.
    #[must_use]
    pub fn counts_as_breaker_failure(&self) -> bool {
        match self {
            Self::Timeout |
            Self::ConnectionFailed(_) |
            Self::HttpError(_, _) |
            Self::InvalidResponse(_) => true,
            Self::InvalidRequest(_) |
            Self::CircuitBreakerOpen |
            Self::ForcedOpen |
            Self::NoProvidersAvailable |
            Self::ConcurrencyLimit => false,
        }
    }

    /// Returns a static label for metrics.
    #[must_use]
    pub fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
            Self::ForcedOpen => "forced_open",
            Self::NoProvidersAvailable => "no_providers",
            Self::ConcurrencyLimit => "concurrency_limit",
        }
    }
}

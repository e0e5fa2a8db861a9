//! Error taxonomy for the tournament core.
//!
//! Two layers, mirroring how failures are handled at runtime:
//!
//! | Error             | Escapes a round? | Escapes a pairing task? |
//! |-------------------|------------------|-------------------------|
//! | `ProviderError`   | no (becomes data)| no                      |
//! | `TournamentError` | n/a              | yes, caught per task    |
//!
//! Provider failures are folded into a `RoundKind` by the match engine and
//! never reach the scheduler. `TournamentError` is reserved for
//! scheduler-internal faults (bad pairing index, poisoned scoreboard) and
//! construction-time validation.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single collaborator call (challenge or attempt request).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network-level failure before a response was received.
    #[error("request failed: {0}")]
    Request(String),

    /// The provider did not answer within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 429 or an equivalent provider-side throttle.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response arrived but did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Credentials for the provider are not configured.
    #[error("API key not configured for {0}")]
    MissingApiKey(String),

    /// No route in the registry can serve the competitor.
    #[error("no provider registered for `{0}`")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Whether a later request to the same provider could plausibly succeed.
    ///
    /// The scheduler never retries on its own; this classification is used
    /// for logging and by providers that implement their own retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::MalformedResponse(_) | Self::MissingApiKey(_) | Self::UnknownProvider(_) => {
                false
            }
        }
    }

    /// Short machine-friendly label used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Status { .. } => "status",
            Self::MalformedResponse(_) => "malformed_response",
            Self::MissingApiKey(_) => "missing_api_key",
            Self::UnknownProvider(_) => "unknown_provider",
        }
    }
}

/// Scheduler-level and construction-time errors.
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("tournament needs at least one competitor")]
    NoCompetitors,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A commit referenced a pairing that was never registered.
    #[error("pairing ({0}, {1}) is not registered on the scoreboard")]
    UnknownPairing(usize, usize),

    /// A pairing index fell outside the competitor set.
    #[error("pairing ({a}, {b}) is out of range for {competitors} competitors")]
    InvalidPairing {
        a: usize,
        b: usize,
        competitors: usize,
    },

    /// A thread panicked while holding the scoreboard lock.
    #[error("scoreboard lock poisoned")]
    StatePoisoned,
}

/// Result type for tournament operations
pub type TournamentResult<T> = Result<T, TournamentError>;

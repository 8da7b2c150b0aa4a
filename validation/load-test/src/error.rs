//! Setup errors for the load engine.
//!
//! Everything that can go wrong before the first virtual user starts is a
//! [`SetupError`]. Failures that happen while the population is running are
//! never errors: they become [`RequestOutcome`](crate::outcome::RequestOutcome)
//! records instead.

use thiserror::Error;

/// Result type alias using SetupError.
pub type SetupResult<T> = Result<T, SetupError>;

/// Fatal, pre-run configuration problems.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("task registry is empty: at least one task must be registered")]
    EmptyRegistry,

    #[error("task '{0}' has weight 0, weights must be >= 1")]
    ZeroWeight(String),

    #[error("unknown task '{name}' (known tasks: {known})")]
    UnknownTask { name: String, known: String },

    #[error("target concurrency must be > 0")]
    InvalidConcurrency,

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid pacing bounds for profile '{profile}': min {min_ms}ms > max {max_ms}ms")]
    InvalidPacing {
        profile: String,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("invalid base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("no user profile has a weight > 0")]
    NoProfiles,

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

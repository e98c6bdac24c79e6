use thiserror::Error;

/// Failure modes of the vendor API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network trouble, timeouts, or server-side errors; safe to retry on
    /// the next cycle.
    #[error("transient api failure: {0}")]
    Transient(String),

    /// The credential was rejected; the caller should refresh and retry.
    #[error("credential rejected by api")]
    Auth,

    /// The request itself was rejected (for example an out-of-range
    /// temperature); retrying with the same value will not help.
    #[error("request rejected by api: {0}")]
    Validation(String),
}

/// Login through the external auth collaborator failed.
///
/// Clonable so a single in-flight login attempt can hand the same outcome
/// to every concurrent waiter.
#[derive(Debug, Clone, Error)]
#[error("authentication failed: {0}")]
pub struct AuthFailure(pub String);

//! Session error types.

/// Failures of the session operations.
///
/// Client-input errors (`MissingArgument`, `NotAuthenticated`) are expected
/// states. `MissingBinding` is a caller bug. The dangling variants mean state
/// referenced by the session has vanished and must not be recreated silently.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A required request input was absent (not merely empty).
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// The session carries no authenticated user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Data session resolution was attempted before a binding existed.
    #[error("Session has no data session binding")]
    MissingBinding,

    /// The bound data session key does not resolve to a live data session.
    #[error("Data session {0} does not exist")]
    DanglingBinding(String),

    /// The authenticated user id no longer resolves to an identity.
    #[error("Identity {0} does not exist")]
    DanglingIdentity(String),

    /// The session store failed.
    #[error("Session store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The identity provider failed.
    #[error("Identity provider error: {0}")]
    Identity(String),
}

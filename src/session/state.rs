//! Session settings and the state trait used by session extractors.

use std::time::Duration;

use crate::db::Database;

/// Default cookie carrying the auth session key.
pub const DEFAULT_COOKIE_NAME: &str = "sessionid";

/// Default auth session lifetime (two weeks).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Default data session lifetime (one year).
pub const DEFAULT_DATA_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Name of the cookie carrying the auth session key.
    pub cookie_name: String,
    /// Lifetime of auth sessions, refreshed on every save.
    pub session_ttl: Duration,
    /// Lifetime of data sessions, refreshed on every login.
    pub data_session_ttl: Duration,
    /// Whether to set the Secure flag on the session cookie.
    pub secure_cookies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            data_session_ttl: DEFAULT_DATA_SESSION_TTL,
            secure_cookies: false,
        }
    }
}

/// Trait for state types that give handlers access to session storage.
pub trait HasSessionBackend {
    fn db(&self) -> &Database;
    fn settings(&self) -> &SessionSettings;
}

/// Macro to implement `HasSessionBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `db: Database`
/// - `settings: Arc<SessionSettings>`
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub settings: Arc<SessionSettings>,
/// }
///
/// impl_has_session_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::session::HasSessionBackend for $state_type {
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn settings(&self) -> &$crate::session::SessionSettings {
                &self.settings
            }
        }
    };
}

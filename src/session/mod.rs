//! Two-tier session state.
//!
//! An auth session is cookie-bound and short-lived. It may carry a binding
//! (`data_session_key`) to a data session, which holds state that must
//! survive logouts and be shared across devices. Handlers receive the auth
//! session explicitly as an extractor and reach the data session through
//! [`resolve`].

mod auth_session;
mod cookie;
mod data_session;
mod error;
mod extractors;
mod login;
mod state;
mod store;

pub use auth_session::{AuthSession, AuthSessionState, DataSessionKey, LOGOUT_REDIRECT};
pub use cookie::{SessionCookie, clear_session_cookie, get_cookie, session_cookie};
pub use data_session::{DataSession, resolve};
pub use error::SessionError;
pub use login::establish_login;
pub use state::{
    DEFAULT_COOKIE_NAME, DEFAULT_DATA_SESSION_TTL, DEFAULT_SESSION_TTL, HasSessionBackend,
    SessionSettings,
};
pub use store::AuthSessionStore;

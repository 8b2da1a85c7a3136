//! Axum extractor for the request's auth session.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::auth_session::AuthSession;
use super::cookie::get_cookie;
use super::error::SessionError;
use super::state::HasSessionBackend;
use super::store::AuthSessionStore;

/// Loads the auth session named by the session cookie.
/// Requests without a usable cookie get a fresh anonymous session.
impl<S> FromRequestParts<S> for AuthSession
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = get_cookie(&parts.headers, &state.settings().cookie_name);
        AuthSessionStore::from_backend(state).load(key).await
    }
}

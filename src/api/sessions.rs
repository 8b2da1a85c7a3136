//! Session state API endpoints.
//!
//! - GET `/last-term` - Last selected term of this session ("" if none)
//! - PUT `/last-term?term=` - Select a term; an empty value unsets it
//! - GET `/full-name` - Display name of the logged-in user
//! - ANY `/logout` - Drop authentication, keep the data session binding, redirect to `/`

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{any, get},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::ApiError;
use crate::db::Database;
use crate::identity;
use crate::impl_has_session_backend;
use crate::session::{
    AuthSession, AuthSessionStore, HasSessionBackend, LOGOUT_REDIRECT, SessionCookie, SessionSettings,
    get_cookie,
};

#[derive(Clone)]
pub struct SessionsState {
    pub db: Database,
    pub settings: Arc<SessionSettings>,
}

impl_has_session_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/last-term", get(get_last_term).put(set_last_term))
        .route("/full-name", get(get_full_name))
        .route("/logout", any(logout))
        .with_state(state)
}

#[derive(Serialize)]
struct TermResponse {
    term: String,
}

#[derive(Deserialize)]
struct TermParams {
    term: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullNameResponse {
    full_name: String,
}

/// Return the session's last term, storing "" if none was ever chosen.
/// Used by the landing page to decide whether to skip term selection.
async fn get_last_term(
    State(state): State<SessionsState>,
    mut session: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    let term = session.get_term();
    let cookie = AuthSessionStore::from_backend(&state)
        .commit(&mut session)
        .await?;

    Ok((cookie, Json(TermResponse { term })))
}

/// Set the session's term. A missing `term` parameter is rejected, an empty
/// one is stored as-is (clicking the title bar unsets the term this way).
async fn set_last_term(
    State(state): State<SessionsState>,
    mut session: AuthSession,
    Query(params): Query<TermParams>,
) -> Result<impl IntoResponse, ApiError> {
    session.set_term(params.term)?;
    let cookie = AuthSessionStore::from_backend(&state)
        .commit(&mut session)
        .await?;

    Ok((cookie, StatusCode::OK))
}

/// First and last name of the logged-in user.
async fn get_full_name(
    State(state): State<SessionsState>,
    session: AuthSession,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = identity::get_full_name(&session, &state.db.users()).await?;
    Ok(Json(FullNameResponse { full_name }))
}

/// Log out and redirect to the site root. Never fails: if the session
/// cannot be updated the cookie is cleared instead.
async fn logout(State(state): State<SessionsState>, headers: HeaderMap) -> impl IntoResponse {
    let store = AuthSessionStore::from_backend(&state);
    let key = get_cookie(&headers, &state.settings().cookie_name);

    let mut session = match store.load(key).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to load session on logout");
            return (store.clear_cookie(), Redirect::to(LOGOUT_REDIRECT));
        }
    };

    let target = session.logout();
    let cookie = if session.is_modified() {
        match store.cycle_key(&mut session).await {
            Ok(cookie) => cookie,
            Err(e) => {
                error!(error = %e, "Failed to save session on logout");
                store.clear_cookie()
            }
        }
    } else {
        SessionCookie::none()
    };

    (cookie, Redirect::to(target))
}

//! Loading and saving auth sessions.

use tracing::{info, warn};

use super::auth_session::AuthSession;
use super::cookie::{SessionCookie, clear_session_cookie, session_cookie};
use super::error::SessionError;
use super::state::{HasSessionBackend, SessionSettings};
use crate::db::{Database, SessionKind, SessionStore};

/// Persists [`AuthSession`]s in the auth key space of the session store.
pub struct AuthSessionStore<'a> {
    store: SessionStore,
    settings: &'a SessionSettings,
}

impl<'a> AuthSessionStore<'a> {
    pub fn new(db: &Database, settings: &'a SessionSettings) -> Self {
        Self {
            store: db.sessions(SessionKind::Auth),
            settings,
        }
    }

    pub fn from_backend<S: HasSessionBackend>(state: &'a S) -> Self {
        Self::new(state.db(), state.settings())
    }

    /// Load the session for a client-supplied key. Unknown or expired keys
    /// yield a fresh anonymous session, as do stored values that no longer
    /// fit the typed state (the unreadable row is dropped).
    pub async fn load(&self, key: Option<&str>) -> Result<AuthSession, SessionError> {
        let Some(key) = key else {
            return Ok(AuthSession::new());
        };

        let Some(values) = self.store.load(key).await? else {
            return Ok(AuthSession::new());
        };

        match AuthSession::from_values(key.to_string(), values) {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!(session = %short(key), error = %e, "Discarding unreadable auth session");
                self.store.delete(key).await?;
                Ok(AuthSession::new())
            }
        }
    }

    /// Save a modified session, issuing a key if it has none.
    /// Returns the cookie to send; unmodified sessions are not written.
    ///
    /// A session whose row was deleted or expired since it was loaded is
    /// never recreated under its old key. It is saved as a new anonymous
    /// session instead.
    pub async fn commit(&self, session: &mut AuthSession) -> Result<SessionCookie, SessionError> {
        if !session.is_modified() {
            return Ok(SessionCookie::none());
        }

        if let Some(key) = session.key().map(str::to_string) {
            if self.write(&key, session).await? {
                session.mark_saved();
                return Ok(self.cookie(&key));
            }
            info!(session = %short(&key), "Auth session ended before save, starting a new one");
            session.detach();
        }

        let key = self.insert(session).await?;
        Ok(self.cookie(&key))
    }

    /// Move the session's values to a fresh key and delete the old one.
    /// If the old row is already gone the session is treated as ended and
    /// loses its authentication, as in [`commit`](Self::commit).
    pub async fn cycle_key(&self, session: &mut AuthSession) -> Result<SessionCookie, SessionError> {
        let Some(old_key) = session.key().map(str::to_string) else {
            return self.commit(session).await;
        };

        if !self.store.delete(&old_key).await? {
            info!(session = %short(&old_key), "Auth session ended before key cycle");
            session.detach();
        }

        let new_key = self.insert(session).await?;
        info!(session = %short(&new_key), "Cycled auth session key");

        Ok(self.cookie(&new_key))
    }

    /// Cookie that detaches the client from any session.
    pub fn clear_cookie(&self) -> SessionCookie {
        SessionCookie(Some(clear_session_cookie(self.settings)))
    }

    fn cookie(&self, key: &str) -> SessionCookie {
        SessionCookie(Some(session_cookie(self.settings, key)))
    }

    /// Save a keyless session under a newly created key.
    async fn insert(&self, session: &mut AuthSession) -> Result<String, SessionError> {
        let key = self.store.create(self.settings.session_ttl).await?;
        if !self.write(&key, session).await? {
            return Err(SessionError::Store(sqlx::Error::RowNotFound));
        }
        session.set_key(key.clone());
        session.mark_saved();
        Ok(key)
    }

    async fn write(&self, key: &str, session: &AuthSession) -> Result<bool, SessionError> {
        let values = session
            .to_values()
            .map_err(|e| SessionError::Store(sqlx::Error::Encode(Box::new(e))))?;
        Ok(self
            .store
            .save(key, &values, self.settings.session_ttl)
            .await?)
    }
}

/// Key prefix safe to put in logs.
pub(crate) fn short(key: &str) -> &str {
    &key[..key.len().min(6)]
}

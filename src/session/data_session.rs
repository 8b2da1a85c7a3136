//! Data sessions and resolution of an auth session's binding.
//!
//! A data session outlives logins and logouts; auth sessions reach it through
//! the `data_session_key` they carry.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use super::auth_session::{AuthSession, DataSessionKey};
use super::error::SessionError;
use crate::db::SessionStore;

/// Handle to one data session. Reads and writes go straight to the store.
#[derive(Clone)]
pub struct DataSession {
    key: DataSessionKey,
    store: SessionStore,
}

impl DataSession {
    pub(crate) fn new(key: DataSessionKey, store: SessionStore) -> Self {
        Self { key, store }
    }

    pub fn key(&self) -> &DataSessionKey {
        &self.key
    }

    /// Read a named value.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SessionError> {
        match self.store.get_value(self.key.as_str(), name).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SessionError::Store(sqlx::Error::Decode(Box::new(e)))),
            None => Ok(None),
        }
    }

    /// Write a named value, visible to every other holder of this key.
    pub async fn set<T: Serialize>(&self, name: &str, value: &T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)
            .map_err(|e| SessionError::Store(sqlx::Error::Encode(Box::new(e))))?;
        if !self.store.set_value(self.key.as_str(), name, &value).await? {
            return Err(SessionError::DanglingBinding(self.key.to_string()));
        }
        Ok(())
    }

    /// Remove a named value.
    pub async fn remove(&self, name: &str) -> Result<(), SessionError> {
        self.store.remove_value(self.key.as_str(), name).await?;
        Ok(())
    }

    /// All values currently in the data session.
    pub async fn values(&self) -> Result<Map<String, Value>, SessionError> {
        self.store
            .load(self.key.as_str())
            .await?
            .ok_or_else(|| SessionError::DanglingBinding(self.key.to_string()))
    }
}

/// Resolve the data session bound to an auth session.
///
/// Fails with `MissingBinding` if the session was never bound and with
/// `DanglingBinding` if the bound key no longer exists. Never creates or
/// repairs a binding.
pub async fn resolve(
    session: &AuthSession,
    data_sessions: &SessionStore,
) -> Result<DataSession, SessionError> {
    let key = session
        .data_session_key()
        .ok_or(SessionError::MissingBinding)?;

    if !data_sessions.exists(key.as_str()).await? {
        return Err(SessionError::DanglingBinding(key.to_string()));
    }

    Ok(DataSession::new(key.clone(), data_sessions.clone()))
}

//! Typed view over an auth session's bag of values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::SessionError;

/// Where the client is sent after logging out.
pub const LOGOUT_REDIRECT: &str = "/";

/// Bag entries owned by the login flow that logout must drop, besides the user id.
const AUTH_FLAG_NAMES: &[&str] = &["_auth_user_backend", "_auth_user_hash"];

/// Key of a data session, as stored inside an auth session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSessionKey(String);

impl DataSessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DataSessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named fields of an auth session. Unknown entries are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_session_key: Option<DataSessionKey>,
    #[serde(
        rename = "_auth_user_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An auth session as seen by one request.
///
/// `key` is None until the session is first saved. Mutations only mark the
/// session modified; persisting is the caller's job (see `AuthSessionStore::commit`).
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    key: Option<String>,
    state: AuthSessionState,
    modified: bool,
}

impl AuthSession {
    /// A fresh, unsaved, anonymous session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from the values loaded for `key`.
    pub fn from_values(key: String, values: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let state = serde_json::from_value(Value::Object(values))?;
        Ok(Self {
            key: Some(key),
            state,
            modified: false,
        })
    }

    /// Flatten the typed state back into a bag of values.
    pub fn to_values(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(&self.state)? {
            Value::Object(values) => Ok(values),
            _ => Ok(Map::new()),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// The stored term, distinguishing "never set" (None) from "" (unset by the user).
    pub fn term(&self) -> Option<&str> {
        self.state.term.as_deref()
    }

    /// Return the last selected term. An absent term is initialised to the
    /// empty string so the default is stored rather than recomputed.
    pub fn get_term(&mut self) -> String {
        if self.state.term.is_none() {
            self.state.term = Some(String::new());
            self.modified = true;
        }
        self.state.term.clone().unwrap_or_default()
    }

    /// Store a term verbatim. The empty string is valid and unsets the term;
    /// only a missing argument is rejected.
    pub fn set_term(&mut self, term: Option<String>) -> Result<(), SessionError> {
        let term = term.ok_or(SessionError::MissingArgument("term"))?;
        self.state.term = Some(term);
        self.modified = true;
        Ok(())
    }

    pub fn data_session_key(&self) -> Option<&DataSessionKey> {
        self.state.data_session_key.as_ref()
    }

    pub fn auth_user_id(&self) -> Option<&str> {
        self.state.auth_user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.auth_user_id.is_some()
    }

    /// Authenticate the session and bind it to a data session in one step.
    pub(crate) fn bind_login(&mut self, user_id: i64, data_session_key: DataSessionKey) {
        self.state.data_session_key = Some(data_session_key);
        self.state.auth_user_id = Some(user_id.to_string());
        self.modified = true;
    }

    /// Drop the authentication state. The data session binding and the term survive.
    pub fn logout(&mut self) -> &'static str {
        if self.clear_auth() {
            self.modified = true;
        }
        LOGOUT_REDIRECT
    }

    /// Turn a session whose stored row has vanished into a new, unsaved,
    /// anonymous one. Whatever logout would keep is carried over.
    pub(crate) fn detach(&mut self) {
        self.clear_auth();
        self.key = None;
        self.modified = true;
    }

    fn clear_auth(&mut self) -> bool {
        let had_auth = self.state.auth_user_id.take().is_some();
        AUTH_FLAG_NAMES
            .iter()
            .fold(had_auth, |acc, name| self.state.extra.remove(*name).is_some() || acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_get_term_initialises_default() {
        let mut session = AuthSession::new();
        assert_eq!(session.term(), None);

        assert_eq!(session.get_term(), "");
        assert!(session.is_modified());
        assert_eq!(session.term(), Some(""));

        session.mark_saved();
        assert_eq!(session.get_term(), "");
        assert!(!session.is_modified());
    }

    #[test]
    fn test_set_term_empty_vs_missing() {
        let mut session = AuthSession::new();

        assert!(matches!(
            session.set_term(None),
            Err(SessionError::MissingArgument("term"))
        ));
        assert_eq!(session.term(), None);
        assert!(!session.is_modified());

        session.set_term(Some("202431".into())).unwrap();
        assert_eq!(session.get_term(), "202431");

        session.set_term(Some(String::new())).unwrap();
        assert_eq!(session.get_term(), "");
    }

    #[test]
    fn test_logout_keeps_binding_and_term() {
        let mut session = AuthSession::from_values(
            "k".into(),
            values(&[
                ("term", json!("202431")),
                ("data_session_key", json!("data-key")),
                ("_auth_user_id", json!("7")),
                ("_auth_user_backend", json!("backend")),
                ("_auth_user_hash", json!("hash")),
                ("saved", json!([1])),
            ]),
        )
        .unwrap();
        assert!(session.is_authenticated());

        assert_eq!(session.logout(), "/");

        assert!(session.is_modified());
        assert!(!session.is_authenticated());
        assert_eq!(session.data_session_key().map(|k| k.as_str()), Some("data-key"));
        assert_eq!(session.term(), Some("202431"));
        assert_eq!(
            session.to_values().unwrap(),
            values(&[
                ("term", json!("202431")),
                ("data_session_key", json!("data-key")),
                ("saved", json!([1])),
            ])
        );
    }

    #[test]
    fn test_logout_when_anonymous_is_a_no_op() {
        let mut session = AuthSession::new();
        assert_eq!(session.logout(), LOGOUT_REDIRECT);
        assert!(!session.is_modified());
    }

    #[test]
    fn test_detach_drops_key_and_authentication() {
        let mut session = AuthSession::from_values(
            "k".into(),
            values(&[
                ("term", json!("202431")),
                ("_auth_user_id", json!("7")),
                ("_auth_user_hash", json!("hash")),
            ]),
        )
        .unwrap();

        session.detach();

        assert!(session.key().is_none());
        assert!(session.is_modified());
        assert!(!session.is_authenticated());
        assert_eq!(
            session.to_values().unwrap(),
            values(&[("term", json!("202431"))])
        );
    }

    #[test]
    fn test_round_trip_preserves_unknown_values() {
        let original = values(&[("term", json!("")), ("schedule_ids", json!([4, 5]))]);
        let session = AuthSession::from_values("k".into(), original.clone()).unwrap();
        assert_eq!(session.to_values().unwrap(), original);
    }

    #[test]
    fn test_bind_login_sets_both_fields() {
        let mut session = AuthSession::new();
        session.bind_login(42, DataSessionKey::new("dk"));
        assert_eq!(session.auth_user_id(), Some("42"));
        assert_eq!(session.data_session_key(), Some(&DataSessionKey::new("dk")));
        assert!(session.is_modified());
    }
}

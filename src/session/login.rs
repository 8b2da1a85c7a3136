//! Establishing the data session binding when a user logs in.

use std::time::Duration;

use tracing::{info, warn};

use super::auth_session::{AuthSession, DataSessionKey};
use super::data_session::DataSession;
use super::error::SessionError;
use super::store::short;
use crate::db::{SessionStore, User, UserStore};

/// Authenticate `session` as `user` and bind it to the user's data session.
///
/// The account's existing data session is reused when it is still live.
/// Otherwise a new one is created and recorded on the user, replacing a
/// dangling key if there was one. Recording only succeeds against the key
/// the caller last saw, so concurrent first logins converge on one data
/// session and the losers' sessions are deleted. The user id and binding are
/// set together, so a committed authenticated session always points at a
/// live data session.
pub async fn establish_login(
    session: &mut AuthSession,
    user: &User,
    users: &UserStore,
    data_sessions: &SessionStore,
    data_session_ttl: Duration,
) -> Result<DataSession, SessionError> {
    let mut bound = user.data_session_key.clone();

    let key = loop {
        if let Some(key) = &bound {
            if data_sessions.touch(key, data_session_ttl).await? {
                break key.clone();
            }
            warn!(
                user_id = user.id,
                data_session = %short(key),
                "Data session binding is dangling, provisioning a new one"
            );
        }

        let key = data_sessions.create(data_session_ttl).await?;
        if users
            .bind_data_session_key(user.id, &key, bound.as_deref())
            .await?
        {
            info!(user_id = user.id, data_session = %short(&key), "Provisioned data session");
            break key;
        }

        // Lost the race to another login, or the user is gone
        data_sessions.delete(&key).await?;
        let current = users
            .get_by_id(user.id)
            .await?
            .ok_or_else(|| SessionError::DanglingIdentity(user.id.to_string()))?;
        bound = current.data_session_key;
    };

    let key = DataSessionKey::new(key);
    session.bind_login(user.id, key.clone());
    Ok(DataSession::new(key, data_sessions.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SessionKind};
    use crate::session::resolve;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_first_login_provisions_data_session() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create("Ada", "Lovelace").await.unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        let data = db.sessions(SessionKind::Data);

        let mut session = AuthSession::new();
        let handle = establish_login(&mut session, &user, &db.users(), &data, TTL)
            .await
            .unwrap();

        assert_eq!(session.auth_user_id(), Some(id.to_string().as_str()));
        assert_eq!(session.data_session_key(), Some(handle.key()));
        let stored = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.data_session_key.as_deref(), Some(handle.key().as_str()));
        assert!(resolve(&session, &data).await.is_ok());
    }

    #[tokio::test]
    async fn test_later_login_reuses_data_session() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create("Ada", "Lovelace").await.unwrap();
        let data = db.sessions(SessionKind::Data);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        let mut laptop = AuthSession::new();
        let first = establish_login(&mut laptop, &user, &db.users(), &data, TTL)
            .await
            .unwrap();
        first.set("saved", &"schedule").await.unwrap();

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        let mut phone = AuthSession::new();
        let second = establish_login(&mut phone, &user, &db.users(), &data, TTL)
            .await
            .unwrap();

        assert_eq!(first.key(), second.key());
        assert_eq!(
            second.get::<String>("saved").await.unwrap().as_deref(),
            Some("schedule")
        );
    }

    #[tokio::test]
    async fn test_dangling_account_binding_is_replaced() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create("Ada", "Lovelace").await.unwrap();
        db.users()
            .bind_data_session_key(id, "lost", None)
            .await
            .unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        let data = db.sessions(SessionKind::Data);

        let mut session = AuthSession::new();
        let handle = establish_login(&mut session, &user, &db.users(), &data, TTL)
            .await
            .unwrap();

        assert_ne!(handle.key().as_str(), "lost");
        assert!(data.exists(handle.key().as_str()).await.unwrap());
        let stored = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.data_session_key.as_deref(), Some(handle.key().as_str()));
    }

    #[tokio::test]
    async fn test_logins_from_same_stale_user_converge() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create("Ada", "Lovelace").await.unwrap();
        let data = db.sessions(SessionKind::Data);

        // Both requests read the user before either bound a data session
        let snapshot = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(snapshot.data_session_key.is_none());

        let mut laptop = AuthSession::new();
        let first = establish_login(&mut laptop, &snapshot, &db.users(), &data, TTL)
            .await
            .unwrap();
        first.set("saved", &"schedule").await.unwrap();

        let mut phone = AuthSession::new();
        let second = establish_login(&mut phone, &snapshot, &db.users(), &data, TTL)
            .await
            .unwrap();

        assert_eq!(first.key(), second.key());
        assert_eq!(laptop.data_session_key(), phone.data_session_key());

        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE kind = 'data'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        // A later login sees what was written through the first handle
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        let mut tablet = AuthSession::new();
        let third = establish_login(&mut tablet, &user, &db.users(), &data, TTL)
            .await
            .unwrap();
        assert_eq!(
            third.get::<String>("saved").await.unwrap().as_deref(),
            Some("schedule")
        );
    }

    #[tokio::test]
    async fn test_login_for_deleted_user_fails() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create("Ada", "Lovelace").await.unwrap();
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        db.users().delete(id).await.unwrap();
        let data = db.sessions(SessionKind::Data);

        let mut session = AuthSession::new();
        let result = establish_login(&mut session, &user, &db.users(), &data, TTL).await;

        assert!(matches!(result, Err(SessionError::DanglingIdentity(_))));
        assert!(!session.is_authenticated());
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}

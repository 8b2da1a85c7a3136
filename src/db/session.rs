//! Expiring key-value session storage.
//!
//! A session is an opaque key mapping to a bag of named JSON values. Two key
//! spaces share the tables, selected by [`SessionKind`]: cookie-bound auth
//! sessions and the long-lived data sessions they point at.

use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePool;

/// Length of generated session keys.
pub const SESSION_KEY_LENGTH: usize = 32;

const SESSION_KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Which key space a [`SessionStore`] operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Ephemeral, cookie-bound sessions.
    Auth,
    /// Long-lived sessions reached through a binding stored in an auth session.
    Data,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Auth => "auth",
            SessionKind::Data => "data",
        }
    }
}

/// Generate a random session key.
pub fn generate_session_key() -> String {
    let mut rng = rand::rng();
    (0..SESSION_KEY_LENGTH)
        .map(|_| SESSION_KEY_CHARS[rng.random_range(0..SESSION_KEY_CHARS.len())] as char)
        .collect()
}

/// SQLite datetime modifier for "now + ttl".
fn expiry_modifier(ttl: Duration) -> String {
    format!("+{} seconds", ttl.as_secs())
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    kind: SessionKind,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, kind: SessionKind) -> Self {
        Self { pool, kind }
    }

    /// Create an empty session and return its key.
    pub async fn create(&self, ttl: Duration) -> Result<String, sqlx::Error> {
        loop {
            let key = generate_session_key();
            let result = sqlx::query(
                "INSERT OR IGNORE INTO sessions (kind, session_key, expires_at)
                 VALUES (?, ?, datetime('now', ?))",
            )
            .bind(self.kind.as_str())
            .bind(&key)
            .bind(expiry_modifier(ttl))
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(key);
            }
        }
    }

    /// Check whether a live (unexpired) session exists for the key.
    pub async fn exists(&self, key: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sessions
             WHERE kind = ? AND session_key = ? AND expires_at > datetime('now')",
        )
        .bind(self.kind.as_str())
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Load every value of a live session. Returns None if missing or expired.
    pub async fn load(&self, key: &str) -> Result<Option<Map<String, Value>>, sqlx::Error> {
        if !self.exists(key).await? {
            return Ok(None);
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, value_json FROM session_values WHERE kind = ? AND session_key = ?",
        )
        .bind(self.kind.as_str())
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        let mut values = Map::new();
        for (name, json) in rows {
            let value: Value =
                serde_json::from_str(&json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            values.insert(name, value);
        }
        Ok(Some(values))
    }

    /// Read a single value from a live session.
    pub async fn get_value(&self, key: &str, name: &str) -> Result<Option<Value>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT v.value_json FROM session_values v
             JOIN sessions s ON s.kind = v.kind AND s.session_key = v.session_key
             WHERE v.kind = ? AND v.session_key = ? AND v.name = ?
               AND s.expires_at > datetime('now')",
        )
        .bind(self.kind.as_str())
        .bind(key)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((json,)) => {
                let value =
                    serde_json::from_str(&json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write a single value. Returns false if the session is missing or expired.
    pub async fn set_value(&self, key: &str, name: &str, value: &Value) -> Result<bool, sqlx::Error> {
        let json = serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let result = sqlx::query(
            "INSERT INTO session_values (kind, session_key, name, value_json)
             SELECT ?, ?, ?, ?
             WHERE EXISTS (
                 SELECT 1 FROM sessions
                 WHERE kind = ? AND session_key = ? AND expires_at > datetime('now')
             )
             ON CONFLICT(kind, session_key, name) DO UPDATE SET value_json = excluded.value_json",
        )
        .bind(self.kind.as_str())
        .bind(key)
        .bind(name)
        .bind(&json)
        .bind(self.kind.as_str())
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a single value.
    pub async fn remove_value(&self, key: &str, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM session_values WHERE kind = ? AND session_key = ? AND name = ?",
        )
        .bind(self.kind.as_str())
        .bind(key)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the whole bag of a live session and push its expiry out by
    /// `ttl`. Returns false, writing nothing, if the session is missing or
    /// expired: a deleted session is never brought back.
    pub async fn save(
        &self,
        key: &str,
        values: &Map<String, Value>,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE sessions SET expires_at = datetime('now', ?)
             WHERE kind = ? AND session_key = ? AND expires_at > datetime('now')",
        )
        .bind(expiry_modifier(ttl))
        .bind(self.kind.as_str())
        .bind(key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM session_values WHERE kind = ? AND session_key = ?")
            .bind(self.kind.as_str())
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for (name, value) in values {
            let json =
                serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
            sqlx::query(
                "INSERT INTO session_values (kind, session_key, name, value_json)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(self.kind.as_str())
            .bind(key)
            .bind(name)
            .bind(&json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Push the expiry of a live session out by `ttl`.
    pub async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET expires_at = datetime('now', ?)
             WHERE kind = ? AND session_key = ? AND expires_at > datetime('now')",
        )
        .bind(expiry_modifier(ttl))
        .bind(self.kind.as_str())
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session and its values.
    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE kind = ? AND session_key = ?")
            .bind(self.kind.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete expired sessions of this kind.
    pub async fn cleanup_expired(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE kind = ? AND expires_at <= datetime('now')")
                .bind(self.kind.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    async fn expire(db: &Database, key: &str) {
        sqlx::query("UPDATE sessions SET expires_at = datetime('now', '-1 seconds') WHERE session_key = ?")
            .bind(key)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[test]
    fn test_generated_key_format() {
        let key = generate_session_key();
        assert_eq!(key.len(), SESSION_KEY_LENGTH);
        assert!(key.bytes().all(|b| SESSION_KEY_CHARS.contains(&b)));
        assert_ne!(key, generate_session_key());
    }

    #[tokio::test]
    async fn test_create_and_set_values() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions(SessionKind::Data);

        let key = store.create(TTL).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(store.load(&key).await.unwrap(), Some(Map::new()));

        assert!(store.set_value(&key, "schedules", &json!([1, 2])).await.unwrap());
        assert!(store.set_value(&key, "schedules", &json!([3])).await.unwrap());
        assert_eq!(
            store.get_value(&key, "schedules").await.unwrap(),
            Some(json!([3]))
        );

        assert!(store.remove_value(&key, "schedules").await.unwrap());
        assert_eq!(store.get_value(&key, "schedules").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_value_on_missing_session() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions(SessionKind::Data);

        assert!(!store.set_value("nope", "a", &json!(1)).await.unwrap());
        assert_eq!(store.load("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let db = Database::open(":memory:").await.unwrap();
        let auth = db.sessions(SessionKind::Auth);
        let data = db.sessions(SessionKind::Data);

        let key = auth.create(TTL).await.unwrap();
        assert!(auth.exists(&key).await.unwrap());
        assert!(!data.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_overwrites_bag() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions(SessionKind::Auth);
        let key = store.create(TTL).await.unwrap();

        let mut first = Map::new();
        first.insert("term".into(), json!("202431"));
        first.insert("other".into(), json!(true));
        assert!(store.save(&key, &first, TTL).await.unwrap());

        let mut second = Map::new();
        second.insert("term".into(), json!(""));
        assert!(store.save(&key, &second, TTL).await.unwrap());

        assert_eq!(store.load(&key).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_save_does_not_recreate_deleted_or_expired_session() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions(SessionKind::Auth);

        let mut values = Map::new();
        values.insert("_auth_user_id".into(), json!("1"));

        let deleted = store.create(TTL).await.unwrap();
        store.delete(&deleted).await.unwrap();
        assert!(!store.save(&deleted, &values, TTL).await.unwrap());
        assert!(!store.exists(&deleted).await.unwrap());

        let expired = store.create(TTL).await.unwrap();
        expire(&db, &expired).await;
        assert!(!store.save(&expired, &values, TTL).await.unwrap());
        assert_eq!(store.load(&expired).await.unwrap(), None);

        assert!(!store.save("never-existed", &values, TTL).await.unwrap());
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM session_values")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_invisible_and_cleaned() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions(SessionKind::Data);

        let key = store.create(TTL).await.unwrap();
        store.set_value(&key, "a", &json!(1)).await.unwrap();
        expire(&db, &key).await;

        assert!(!store.exists(&key).await.unwrap());
        assert_eq!(store.load(&key).await.unwrap(), None);
        assert_eq!(store.get_value(&key, "a").await.unwrap(), None);
        assert!(!store.touch(&key, TTL).await.unwrap());

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM session_values")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }
}

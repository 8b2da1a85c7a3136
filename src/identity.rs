//! User identity lookup.

use std::future::Future;

use crate::db::UserStore;
use crate::session::{AuthSession, SessionError};

/// Error type returned by identity providers.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// An authenticated principal, as far as this service needs to know it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Identity {
    /// First and last name separated by a space.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Source of identities by numeric user id.
pub trait IdentityProvider: Send + Sync {
    /// Look up an identity. Returns None if no such user exists.
    fn identity(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<Identity>, ProviderError>> + Send;
}

impl IdentityProvider for UserStore {
    async fn identity(&self, user_id: i64) -> Result<Option<Identity>, ProviderError> {
        let user = self.get_by_id(user_id).await?;
        Ok(user.map(|u| Identity {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
        }))
    }
}

/// Display name of the session's authenticated user.
///
/// Anonymous sessions fail with `NotAuthenticated` without consulting the
/// provider. A user id the provider cannot find is a `DanglingIdentity`.
pub async fn get_full_name<P: IdentityProvider>(
    session: &AuthSession,
    provider: &P,
) -> Result<String, SessionError> {
    let user_id = session
        .auth_user_id()
        .ok_or(SessionError::NotAuthenticated)?;

    let id: i64 = user_id
        .parse()
        .map_err(|_| SessionError::DanglingIdentity(user_id.to_string()))?;

    let identity = provider
        .identity(id)
        .await
        .map_err(|e| SessionError::Identity(e.to_string()))?
        .ok_or_else(|| SessionError::DanglingIdentity(user_id.to_string()))?;

    Ok(identity.full_name())
}

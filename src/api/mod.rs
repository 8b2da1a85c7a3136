mod error;
mod sessions;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::session::SessionSettings;

pub use error::ApiError;
pub use sessions::SessionsState;

/// Create the API router.
pub fn create_api_router(db: Database, settings: Arc<SessionSettings>) -> Router {
    let sessions_state = sessions::SessionsState { db, settings };

    Router::new().merge(sessions::router(sessions_state))
}

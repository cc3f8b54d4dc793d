use serde::Serialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::AppResult;

/// Session key holding the authenticated user's id. Written by the login flow.
pub const USER_ID: &str = "user_id";

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}

impl Principal {
    /// Resolves the principal behind an HTTP session. A session pointing at a
    /// deleted user counts as unauthenticated.
    pub async fn from_session(session: &Session, db_pool: &SqlitePool) -> AppResult<Option<Principal>> {
        let Some(user_id) = session.get::<i64>(USER_ID).await? else {
            return Ok(None);
        };

        Ok(Principal::load(db_pool, user_id).await?)
    }

    pub async fn load(db_pool: &SqlitePool, user_id: i64) -> Result<Option<Principal>, sqlx::Error> {
        let username: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id=?")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;

        Ok(username.map(|(username,)| Principal { user_id, username }))
    }
}

pub async fn create_user(db_pool: &SqlitePool, username: &str) -> Result<Principal, sqlx::Error> {
    let (user_id,): (i64,) = sqlx::query_as("INSERT INTO users (username) VALUES (?) RETURNING id")
        .bind(username)
        .fetch_one(db_pool)
        .await?;

    tracing::info!(user_id, username, "created user");
    Ok(Principal { user_id, username: username.to_owned() })
}

pub mod membership;
pub mod messages;
mod history;

use axum::{routing::get, Router};
use sqlx::SqlitePool;

use crate::{AppState, StoreError, db};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/club/{club_id}/messages", get(history::history).post(history::post_message))
}

pub async fn create_club(db_pool: &SqlitePool, name: &str, description: &str, admin_id: i64) -> Result<i64, StoreError> {
    let (club_id,): (i64,) = sqlx::query_as(
        "INSERT INTO clubs (name,description,admin_id,created_at) VALUES (?,?,?,?) RETURNING id",
    )
        .bind(name)
        .bind(description)
        .bind(admin_id)
        .bind(db::now_millis())
        .fetch_one(db_pool)
        .await
        .map_err(|err| StoreError::from_insert(err, "club"))?;

    tracing::info!(club_id, name, admin_id, "created club");
    Ok(club_id)
}

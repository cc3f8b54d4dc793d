mod notifier;

use axum::{debug_handler, extract::State, response::{IntoResponse, Response}, routing::{get, post}, Json, Router};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use tower_sessions::Session;

use crate::{AppResult, AppState, ChatError, StoreError, db, session::Principal};

pub use notifier::Notifier;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(unread_page))
        .route("/notifications/read", post(mark_read_page))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn insert<'e>(executor: impl SqliteExecutor<'e>, user_id: i64, content: &str) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO notifications (user_id,content,created_at) VALUES (?,?,?)")
        .bind(user_id)
        .bind(content)
        .bind(db::now_millis())
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn unread(db_pool: &SqlitePool, user_id: i64) -> Result<Vec<Notification>, StoreError> {
    let rows: Vec<(i64, String, i64)> = sqlx::query_as(
        "SELECT id,content,created_at FROM notifications WHERE user_id=? AND is_read=0 ORDER BY created_at,id",
    )
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for (id, content, created_at) in rows {
        notifications.push(Notification { id, content, created_at: db::from_millis(created_at)? });
    }
    Ok(notifications)
}

pub async fn mark_all_read(db_pool: &SqlitePool, user_id: i64) -> Result<u64, StoreError> {
    let updated = sqlx::query("UPDATE notifications SET is_read=1 WHERE user_id=? AND is_read=0")
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(updated.rows_affected())
}

#[debug_handler(state = AppState)]
async fn unread_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(principal) = Principal::from_session(&session, &db_pool).await? else {
        return Ok(ChatError::Unauthenticated.into_response());
    };

    Ok(Json(unread(&db_pool, principal.user_id).await?).into_response())
}

#[debug_handler(state = AppState)]
async fn mark_read_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(principal) = Principal::from_session(&session, &db_pool).await? else {
        return Ok(ChatError::Unauthenticated.into_response());
    };

    let marked = mark_all_read(&db_pool, principal.user_id).await?;
    Ok(Json(serde_json::json!({ "marked": marked })).into_response())
}

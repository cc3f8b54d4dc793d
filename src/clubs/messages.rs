use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{StoreError, db, events::{ClubEvent, EventBus}, session::Principal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub club_id: i64,
    pub sender_id: i64,
    pub sender: String,
    /// Already HTML-escaped.
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Escapes the characters that matter inside HTML text and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Persists a message if, at the moment of the write, the sender is the club
/// admin or an approved member. The membership check and the insert are one
/// statement, so a revocation racing with the send either lands before it or
/// after it, never in between.
pub async fn append(
    db_pool: &SqlitePool,
    bus: &EventBus,
    club_id: i64,
    sender: &Principal,
    content: &str,
) -> Result<Message, StoreError> {
    let id = Uuid::now_v7().to_string();
    let content = escape_html(content);
    let created_at = db::now_millis();

    let inserted = sqlx::query(
        "INSERT INTO messages (id,club_id,sender_id,content,created_at) \
         SELECT ?,c.id,?,?,? FROM clubs c \
         WHERE c.id=? AND (c.admin_id=? OR EXISTS ( \
             SELECT 1 FROM memberships m WHERE m.club_id=c.id AND m.user_id=? AND m.status='approved'))",
    )
        .bind(&id)
        .bind(sender.user_id)
        .bind(&content)
        .bind(created_at)
        .bind(club_id)
        .bind(sender.user_id)
        .bind(sender.user_id)
        .execute(db_pool)
        .await?;

    if inserted.rows_affected() == 0 {
        return Err(StoreError::Rejected(format!("{} is not a member of the club", sender.username)));
    }

    tracing::debug!(message_id = %id, club_id, sender_id = sender.user_id, "message stored");
    bus.emit(ClubEvent::MessagePosted { message_id: id.clone(), club_id, sender_id: sender.user_id });

    Ok(Message {
        id,
        club_id,
        sender_id: sender.user_id,
        sender: sender.username.clone(),
        content,
        timestamp: db::from_millis(created_at)?,
    })
}

/// Visible messages of a club, oldest first.
pub async fn list(db_pool: &SqlitePool, club_id: i64) -> Result<Vec<Message>, StoreError> {
    let rows: Vec<(String, i64, String, String, i64)> = sqlx::query_as(
        "SELECT m.id,m.sender_id,u.username,m.content,m.created_at FROM messages m \
         JOIN users u ON u.id=m.sender_id \
         WHERE m.club_id=? AND m.is_deleted=0 \
         ORDER BY m.created_at,m.rowid",
    )
        .bind(club_id)
        .fetch_all(db_pool)
        .await?;

    rows.into_iter()
        .map(|(id, sender_id, sender, content, created_at)| -> Result<Message, StoreError> {
            Ok(Message { id, club_id, sender_id, sender, content, timestamp: db::from_millis(created_at)? })
        })
        .collect()
}

/// Hides a message from `list`. Frames already delivered are unaffected.
pub async fn soft_delete(db_pool: &SqlitePool, message_id: &str) -> Result<(), StoreError> {
    let updated = sqlx::query("UPDATE messages SET is_deleted=1 WHERE id=?")
        .bind(message_id)
        .execute(db_pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound("message"));
    }
    Ok(())
}

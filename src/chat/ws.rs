use axum::{debug_handler, extract::{Path, State, WebSocketUpgrade}, response::{IntoResponse, Response}};
use tokio::sync::mpsc;
use tower_sessions::Session;

use crate::{AppResult, AppState, session::Principal};

use super::session::{ChatSession, OUTBOUND_CAPACITY};

/// The handshake runs before the upgrade, so a rejected client gets a plain
/// HTTP status and never reaches the room group.
#[debug_handler(state = AppState)]
pub async fn chat_ws(
    Path(room_name): Path<String>,
    State(app): State<AppState>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let principal = Principal::from_session(&session, &app.db_pool).await?;

    let (outbound, inbox) = mpsc::channel(OUTBOUND_CAPACITY);
    let chat = match ChatSession::connect(&app, principal, &room_name, outbound).await {
        Ok(chat) => chat,
        Err(err) => return Ok(err.into_response()),
    };

    Ok(ws
        .on_failed_upgrade(|err| tracing::warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| chat.run(socket, inbox)))
}

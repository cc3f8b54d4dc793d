use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    AppResult, AppState, ChatError, StoreError,
    chat::{RoomId, frame::{Outbound, validate_message}},
    session::Principal,
};

use super::{membership, messages::{self, Message}};

#[derive(Serialize)]
pub(crate) struct History {
    room: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
pub(crate) struct PostMessage {
    message: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    State(app): State<AppState>,
    session: Session,
    Path(club_id): Path<i64>,
) -> AppResult<Response> {
    let Some(principal) = Principal::from_session(&session, &app.db_pool).await? else {
        return Ok(ChatError::Unauthenticated.into_response());
    };

    if !membership::authorize(&app.db_pool, principal.user_id, club_id).await? {
        tracing::warn!(user = %principal.username, club_id, "history requested by non-member");
        return Ok(ChatError::Forbidden(club_id).into_response());
    }

    Ok(Json(History {
        room: RoomId::for_club(club_id).to_string(),
        messages: messages::list(&app.db_pool, club_id).await?,
    }).into_response())
}

/// Plain HTTP send. Stored and fanned out exactly like a websocket
/// `chat_message`, without a `temp_id`.
#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    State(app): State<AppState>,
    session: Session,
    Path(club_id): Path<i64>,
    Json(PostMessage { message }): Json<PostMessage>,
) -> AppResult<Response> {
    let Some(principal) = Principal::from_session(&session, &app.db_pool).await? else {
        return Ok(ChatError::Unauthenticated.into_response());
    };

    let content = match validate_message(&message) {
        Ok(content) => content,
        Err(err) => return Ok(err.into_response()),
    };

    let stored = match messages::append(&app.db_pool, &app.bus, club_id, &principal, content).await {
        Ok(stored) => stored,
        Err(err @ StoreError::Rejected(_)) => return Ok(ChatError::from(err).into_response()),
        Err(err) => return Err(err.into()),
    };

    let room = RoomId::for_club(club_id);
    let _ = app.registry.broadcast(&room.group(), &Outbound::chat_message(&stored, None))?;

    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

//! Per-connection protocol state machine.
//!
//! ```text
//! Connecting ──► Authorizing ──► Joined ──► Closed
//!     │               │                        ▲
//!     └───────────────┴──── rejected ──────────┘
//! ```

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    frame::{Inbound, MalformedFrame, Outbound, SessionId, validate_message},
    room::RoomId,
};
use crate::{AppState, ChatError, clubs::{membership, messages}, session::Principal};

/// Frames queued for one client before broadcasts to it start being dropped.
pub const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authorizing,
    Joined,
    Closed,
}

pub struct ChatSession {
    id: SessionId,
    principal: Principal,
    room: RoomId,
    group: String,
    joined_at: OffsetDateTime,
    state: SessionState,
    outbound: mpsc::Sender<Arc<str>>,
    app: AppState,
}

impl ChatSession {
    /// Runs the handshake. On success the session is registered in its room
    /// group and a `joined` frame is queued on `outbound`. On failure nothing
    /// is registered.
    pub async fn connect(
        app: &AppState,
        principal: Option<Principal>,
        room_name: &str,
        outbound: mpsc::Sender<Arc<str>>,
    ) -> Result<ChatSession, ChatError> {
        let mut state = SessionState::Connecting;
        debug!(room = room_name, ?state, "chat handshake");

        let Some(principal) = principal else {
            warn!(room = room_name, "unauthenticated chat connection attempt");
            return Err(ChatError::Unauthenticated);
        };
        let room = RoomId::parse(room_name).inspect_err(|_| {
            warn!(user_id = principal.user_id, room = room_name, "invalid room name");
        })?;
        info!(user = %principal.username, %room, "user trying to connect to room");

        state = SessionState::Authorizing;
        let authorized = membership::authorize(&app.db_pool, principal.user_id, room.club_id())
            .await
            .map_err(|err| {
                error!(user_id = principal.user_id, %room, error = %err, "membership lookup failed");
                ChatError::Transport(format!("membership lookup failed: {err}"))
            })?;
        if !authorized {
            warn!(user = %principal.username, %room, "rejected chat connection from non-member");
            return Err(ChatError::Forbidden(room.club_id()));
        }
        debug!(user_id = principal.user_id, %room, ?state, "authorized");

        let mut session = ChatSession {
            id: SessionId::new(),
            group: room.group(),
            principal,
            room,
            joined_at: OffsetDateTime::now_utc(),
            state,
            outbound,
            app: app.clone(),
        };

        app.registry.join(&session.group, session.id, &session.outbound);
        session.state = SessionState::Joined;
        session.send_own(&Outbound::Joined { session_id: session.id, room: room.to_string() }).await?;

        info!(user = %session.principal.username, %room, session_id = %session.id, "joined room");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn joined_at(&self) -> OffsetDateTime {
        self.joined_at
    }

    /// Handles one inbound text frame. Validation and persistence failures are
    /// answered to this client only; an `Err` means the connection must close.
    pub async fn handle_text(&mut self, raw: &str) -> Result<(), ChatError> {
        if self.state != SessionState::Joined {
            return Err(ChatError::Transport("session is not joined".to_owned()));
        }

        let (outcome, temp_id) = match Inbound::parse(raw) {
            Ok(Inbound::ChatMessage { message, temp_id }) => (self.post_message(&message, temp_id.clone()).await, temp_id),
            Ok(Inbound::Typing { typing }) => (self.broadcast_typing(typing), None),
            Err(MalformedFrame { reason, temp_id }) => {
                warn!(session_id = %self.id, reason = %reason, "malformed frame");
                (Err(ChatError::Validation(reason)), temp_id)
            }
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(session_id = %self.id, kind = err.kind(), error = %err, "frame refused");
                self.send_own(&Outbound::error(&err, temp_id)).await
            }
        }
    }

    /// Non-text payloads are refused like any other malformed frame.
    pub async fn reject_frame(&mut self, reason: &str) -> Result<(), ChatError> {
        let err = ChatError::Validation(reason.to_owned());
        self.send_own(&Outbound::error(&err, None)).await
    }

    async fn post_message(&self, message: &str, temp_id: Option<String>) -> Result<(), ChatError> {
        let content = validate_message(message)?;

        // Membership is re-checked by the insert itself.
        let stored = messages::append(&self.app.db_pool, &self.app.bus, self.room.club_id(), &self.principal, content)
            .await
            .inspect_err(|err| warn!(session_id = %self.id, user_id = self.principal.user_id, error = %err, "message not stored"))?;

        let _ = self.app.registry.broadcast(&self.group, &Outbound::chat_message(&stored, temp_id))?;
        Ok(())
    }

    fn broadcast_typing(&self, typing: bool) -> Result<(), ChatError> {
        let frame = Outbound::Typing { typing, username: self.principal.username.clone(), origin: self.id };
        let _ = self.app.registry.broadcast(&self.group, &frame)?;
        Ok(())
    }

    async fn send_own(&self, frame: &Outbound) -> Result<(), ChatError> {
        let json = serde_json::to_string(frame).map_err(|err| ChatError::Transport(err.to_string()))?;
        self.outbound
            .send(json.into())
            .await
            .map_err(|_| ChatError::Transport("client writer is gone".to_owned()))
    }

    /// Leaves the room group. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let _ = self.app.registry.leave(&self.group, self.id);
        self.state = SessionState::Closed;
        debug!(session_id = %self.id, room = %self.room, "session closed");
    }

    /// Pumps the socket until either side goes away. `inbox` is the receiving
    /// half of the queue handed to [`ChatSession::connect`].
    pub async fn run(mut self, socket: WebSocket, mut inbox: mpsc::Receiver<Arc<str>>) {
        let (mut sender, mut receiver) = socket.split();

        let mut writer = tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        loop {
            tokio::select! {
                incoming = receiver.next() => {
                    let handled = match incoming {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                        Some(Ok(Message::Binary(_))) => self.reject_frame("binary frames are not supported").await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => Ok(()),
                        Some(Err(err)) => {
                            debug!(session_id = %self.id, error = %err, "websocket read failed");
                            break;
                        }
                    };
                    if let Err(err) = handled {
                        error!(session_id = %self.id, room = %self.room, error = %err, "closing chat connection");
                        break;
                    }
                }
                _ = &mut writer => {
                    debug!(session_id = %self.id, "client writer finished");
                    break;
                }
            }
        }

        self.close();
        writer.abort();
        info!(user = %self.principal.username, room = %self.room, "left room");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

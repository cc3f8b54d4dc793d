//! Real-time club chat over websockets.

pub mod frame;
pub mod registry;
pub mod room;
pub mod session;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use registry::RoomRegistry;
pub use room::RoomId;
pub use session::{ChatSession, SessionState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/chat/{room_name}", get(ws::chat_ws))
}

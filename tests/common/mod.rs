#![allow(dead_code)]

use std::sync::Arc;

use clubchat::{
    AppState,
    chat::ChatSession,
    clubs::{self, membership::{self, MembershipStatus}},
    db,
    events::EventBus,
    session::{self, Principal},
};
use serde_json::Value;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tokio::sync::mpsc;

/// One connection, so every query sees the same in-memory database.
pub async fn pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&db_pool).await.unwrap();
    db_pool
}

pub struct Club {
    pub app: AppState,
    pub club_id: i64,
    pub admin: Principal,
}

impl Club {
    pub async fn new() -> Club {
        let app = AppState::new(pool().await, EventBus::new(64));
        let admin = session::create_user(&app.db_pool, "admin").await.unwrap();
        let club_id = clubs::create_club(&app.db_pool, "Chess", "Weekly games", admin.user_id).await.unwrap();
        Club { app, club_id, admin }
    }

    /// Creates a user with a membership row in the given status.
    pub async fn member(&self, username: &str, status: MembershipStatus) -> (Principal, i64) {
        let user = session::create_user(&self.app.db_pool, username).await.unwrap();
        let membership_id = membership::request_membership(&self.app.db_pool, user.user_id, self.club_id).await.unwrap();
        if status != MembershipStatus::Pending {
            membership::set_status(&self.app.db_pool, &self.app.bus, membership_id, status).await.unwrap();
        }
        (user, membership_id)
    }

    pub async fn outsider(&self, username: &str) -> Principal {
        session::create_user(&self.app.db_pool, username).await.unwrap()
    }

    pub fn room(&self) -> String {
        format!("club_{}", self.club_id)
    }

    /// Joins the club room and consumes the `joined` frame.
    pub async fn join(&self, principal: &Principal) -> Client {
        let (outbound, mut inbox) = mpsc::channel(32);
        let session = ChatSession::connect(&self.app, Some(principal.clone()), &self.room(), outbound).await.unwrap();
        let joined = next_frame(&mut inbox).unwrap();
        assert_eq!(joined["type"], "joined");
        assert_eq!(joined["session_id"], session.id().to_string());
        Client { session, inbox }
    }
}

pub struct Client {
    pub session: ChatSession,
    pub inbox: mpsc::Receiver<Arc<str>>,
}

impl Client {
    pub fn next(&mut self) -> Option<Value> {
        next_frame(&mut self.inbox)
    }

    pub fn assert_silent(&mut self) {
        assert_eq!(self.next(), None);
    }
}

/// Frames are queued synchronously during `handle_text`, so no waiting is needed.
pub fn next_frame(inbox: &mut mpsc::Receiver<Arc<str>>) -> Option<Value> {
    inbox.try_recv().ok().map(|raw| serde_json::from_str(&raw).unwrap())
}

pub mod appresult;
pub mod chat;
pub mod clubs;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod notifications;
pub mod session;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};
pub use error::{ChatError, StoreError};

use chat::RoomRegistry;
use events::EventBus;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: Arc<RoomRegistry>,
    pub bus: EventBus,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, bus: EventBus) -> Self {
        Self {
            db_pool,
            registry: Arc::new(RoomRegistry::new()),
            bus,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(chat::router())
        .merge(clubs::router())
        .merge(notifications::router())
}

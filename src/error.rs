use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

/// Errors raised by the membership and message tables.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write was refused by the membership predicate.
    #[error("{0}")]
    Rejected(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("stored timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

impl StoreError {
    pub(crate) fn from_insert(err: sqlx::Error, what: &'static str) -> StoreError {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists(what),
            _ => StoreError::Database(err),
        }
    }
}

/// Failure taxonomy of a chat connection.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid room name: {0}")]
    InvalidRoom(String),

    #[error("not a member of club {0}")]
    Forbidden(i64),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Persistence(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChatError {
    /// Fatal errors close the connection, the rest are answered with an `error` frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChatError::Validation(_) | ChatError::Persistence(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::InvalidRoom(_) => "invalid_room",
            ChatError::Forbidden(_) => "forbidden",
            ChatError::Validation(_) => "validation",
            ChatError::Persistence(_) => "persistence",
            ChatError::Transport(_) => "transport",
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(reason) => ChatError::Persistence(reason),
            other => {
                tracing::error!(error = %other, "message write failed");
                ChatError::Persistence("could not store message".into())
            }
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ChatError::InvalidRoom(_) | ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Forbidden(_) | ChatError::Persistence(_) => StatusCode::FORBIDDEN,
            ChatError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

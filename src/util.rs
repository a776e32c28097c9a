use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Single error type for the whole crate. The server layer maps each
/// variant onto an HTTP status; everything below it just bubbles these
/// up with `?`.
#[derive(Debug, Error)]
pub enum ForumErr {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl ForumErr {
    pub fn validation(msg: impl Into<String>) -> ForumErr {
        ForumErr::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> ForumErr {
        ForumErr::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> ForumErr {
        ForumErr::NotFound(msg.into())
    }
}

impl From<rusqlite::Error> for ForumErr {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                ForumErr::NotFound(String::from("no such row"))
            },
            err => ForumErr::Database(format!("{}", err)),
        }
    }
}

impl From<r2d2::Error> for ForumErr {
    fn from(err: r2d2::Error) -> Self {
        ForumErr::Database(format!("{}", err))
    }
}

pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

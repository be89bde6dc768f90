use thiserror::Error;

use crate::chat::ChatState;
use crate::config::data::DataError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported store type: {0}")]
    UnsupportedStore(String),

    #[error("chat session is busy ({0:?})")]
    Busy(ChatState),

    #[error("session is already being ended by another tab")]
    AlreadyEnding,

    #[error("invalid header name: {0}")]
    InvalidHeader(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("message is empty")]
    EmptyMessage,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#![forbid(unsafe_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("user is not signed in")]
    NotSignedIn,

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("user storage document does not exist")]
    NoUserStorage,

    #[error("trigger sync error: {0}")]
    TriggerSync(String),

    #[error("feed fetch error: {0}")]
    FeedFetch(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("push transport error: {0}")]
    Push(String),

    #[error("account source error: {0}")]
    Accounts(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

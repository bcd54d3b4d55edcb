// shared/src/lib.rs

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("read failure: {0}")]
    ReadFailure(String),
    #[error("write failure: {0}")]
    WriteFailure(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;

//! Error type shared by the UDULib crates
//!
//! The HTTP service maps these onto status codes: `NotFound` is 404,
//! `InvalidInput` 400, `Auth` 401 and everything else 500.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be loaded or failed validation
    #[error("config: {0}")]
    Config(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Rejected user input; the message is shown to the caller
    #[error("{0}")]
    InvalidInput(String),

    /// Bad credentials or an unusable bearer token
    #[error("{0}")]
    Auth(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_for_callers() {
        assert_eq!(Error::invalid("password too short").to_string(), "password too short");
        assert_eq!(Error::NotFound("Config file".into()).to_string(), "Config file not found");
        assert_eq!(Error::config("bcrypt_cost out of range").to_string(), "config: bcrypt_cost out of range");
    }
}

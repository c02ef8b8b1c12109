use thiserror::Error;

use crate::bus::BusError;
use crate::token::TokenError;

/// Top-level error type for the fallible ambient operations that aren't
/// actor message round-trips (those carry their own outcome types instead —
/// see [`crate::server::messages::AuthOutcome`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

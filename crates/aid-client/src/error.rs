//! Client errors.

use aid_agent::AgentError;
use aid_core::Error as CoreError;
use aid_keeper::KeeperError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Key manager error: {0}")]
    Keeper(#[from] KeeperError),

    #[error("Agent rejected request: {0}")]
    Agent(#[from] AgentError),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

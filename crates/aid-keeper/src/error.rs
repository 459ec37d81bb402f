//! Errors raised by key managers.

use crate::params::Algorithm;
use aid_core::Error as CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("{strategy} strategy cannot use {given} parameters")]
    ParamsMismatch { strategy: Algorithm, given: Algorithm },

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Stored key set {0} is malformed")]
    MalformedKeySet(String),
}

pub type Result<T> = std::result::Result<T, KeeperError>;

//! Error types for aid-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Threshold needs {required} key slots, {provided} provided")]
    ThresholdKeyMismatch { required: u64, provided: usize },

    #[error("Key set must not be empty")]
    EmptyKeySet,

    #[error("Invalid witness operation: {0}")]
    InvalidWitnessOp(String),

    #[error("Witness threshold {toad} exceeds witness count {witnesses}")]
    ToadExceedsWitnessCount { toad: u64, witnesses: usize },

    #[error("Group member mismatch: {0}")]
    GroupMemberMismatch(String),

    #[error("Unknown key strategy: {0}")]
    UnknownKeyStrategy(String),

    #[error("{0} invalid identifier update type, only 'rotate', 'interact' or 'authorize' allowed")]
    UnsupportedUpdateType(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signatures at {0:?} do not satisfy the signing threshold")]
    InsufficientSignatures(Vec<usize>),

    #[error("Sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("Digest mismatch: {0}")]
    DigestMismatch(String),

    #[error("Identifier {0} is not transferable")]
    NonTransferable(String),

    #[error("Event does not establish an identifier: {0}")]
    NotEstablished(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

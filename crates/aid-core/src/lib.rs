//! # aid-core
//!
//! Core primitives for Autonomic Identifiers (AIDs).
//!
//! This crate provides:
//! - Signing thresholds (simple and weighted)
//! - Key state and its transitions
//! - Event bodies, their codec and self-addressing digests
//! - Pure builders for inception, rotation, interaction and reply events
//! - Group key material for multi-signer identifiers

pub mod builder;
pub mod error;
pub mod event;
pub mod group;
pub mod keys;
pub mod prefix;
pub mod signing;
pub mod state;
pub mod threshold;
pub mod verify;

pub use builder::{
    InceptionArgs, RotationArgs, build_authorization_reply, build_inception, build_interaction,
    build_rotation,
};
pub use error::Error;
pub use event::{Event, Ilk, Role};
pub use group::GroupKeyMaterial;
pub use keys::IndexedSignature;
pub use prefix::{Prefix, Said};
pub use state::{KeyConfig, KeyState, WitnessDelta};
pub use threshold::Threshold;

/// Result type for aid-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An event paired with its detached signatures.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignedEvent {
    pub event: Event,
    pub signatures: Vec<IndexedSignature>,
}

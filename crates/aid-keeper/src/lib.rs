//! # aid-keeper
//!
//! Key managers for AID controllers.
//!
//! A [`Manager`] holds one [`KeyStrategy`] per [`Algorithm`] and dispatches by
//! the tag carried in an identifier's [`KeyParams`]:
//! - [`SaltyStrategy`]: keys derived from a secret salt and a path index
//! - [`RandyStrategy`]: random keys kept per key set
//! - [`GroupStrategy`]: one member's slot in a multi-signer group

pub mod error;
pub mod group;
pub mod manager;
pub mod params;
pub mod randy;
pub mod salty;

pub use error::{KeeperError, Result};
pub use group::GroupStrategy;
pub use manager::{KeyManager, KeyStrategy, Manager};
pub use params::{
    Algorithm, DEFAULT_STEM, GroupMember, GroupParams, KeyParams, RandyParams, SaltyParams,
};
pub use randy::{RandyStrategy, StoredKeySet};
pub use salty::SaltyStrategy;

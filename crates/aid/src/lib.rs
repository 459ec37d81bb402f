//! # Autonomic Identifiers (AID)
//!
//! Self-certifying identifiers controlled by a signed, hash-chained sequence
//! of key events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aid::client::{ClientConfig, CreateOptions, Identifiers, LocalTransport};
//! use aid::keeper::{Manager, SaltyStrategy};
//!
//! # async fn run() -> aid::client::Result<()> {
//! let manager = Manager::new().with(SaltyStrategy::new(SaltyStrategy::random_salt()));
//! let ids = Identifiers::new(LocalTransport::default(), manager, ClientConfig::default());
//!
//! let created = ids.create("alice", CreateOptions::default()).await?;
//! println!("prefix: {}", created.accepted.prefix);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Thresholds, key state, event construction
//! - [`keeper`] - Key derivation strategies
//! - [`agent`] - Agent that accepts signed events
//! - [`client`] - Lifecycle orchestration
//!
//! ## Re-exports
//!
//! Common types are re-exported at the crate root for convenience.

pub use aid_agent as agent;
pub use aid_client as client;
pub use aid_core as core;
pub use aid_keeper as keeper;

// Re-export common types at root
pub use aid_core::{Error, Event, KeyState, Prefix, Result, Threshold};

//! # aid-client
//!
//! Controller-side orchestration of the AID lifecycle.
//!
//! [`Identifiers`] derives keys through a [`aid_keeper::KeyManager`], builds
//! events with `aid-core`, signs them and submits them through a
//! [`Transport`]: [`LocalTransport`] for an agent in the same process,
//! [`HttpTransport`] for the agent service. Operations on one alias are
//! serialized; the salt-derivation index only advances once an inception has
//! been accepted.

pub mod config;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use identifiers::{
    CreateOptions, GroupRotation, Identifiers, KeySource, RotateOptions, Submission, UpdateKind,
    UpdateOptions,
};
pub use http::HttpTransport;
pub use transport::{LocalTransport, Transport};

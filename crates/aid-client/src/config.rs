//! Client configuration.

use aid_keeper::{Algorithm, DEFAULT_STEM};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Stem mixed into salty derivation paths.
    pub stem: String,
    /// Strategy used when a create does not name one.
    pub algorithm: Algorithm,
    /// Current keys per new identifier.
    pub count: usize,
    /// Next keys committed per establishment event.
    pub next_count: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stem: DEFAULT_STEM.to_string(),
            algorithm: Algorithm::Salty,
            count: 1,
            next_count: 1,
        }
    }
}

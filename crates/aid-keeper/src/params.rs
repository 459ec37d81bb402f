//! Key parameter records.
//!
//! These are stored with an identifier so later rotations derive the same
//! keys the inception committed to.

use aid_core::{GroupKeyMaterial, Prefix};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default stem mixed into salty derivation paths.
pub const DEFAULT_STEM: &str = "aid:keeper";

/// Key derivation strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Deterministic keys from a secret salt.
    Salty,
    /// Randomly generated keys, stored per key set.
    Randy,
    /// One slot of a multi-signer group.
    Group,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Salty => "salty",
            Algorithm::Randy => "randy",
            Algorithm::Group => "group",
        })
    }
}

impl std::str::FromStr for Algorithm {
    type Err = aid_core::Error;

    fn from_str(s: &str) -> aid_core::Result<Self> {
        match s {
            "salty" => Ok(Algorithm::Salty),
            "randy" => Ok(Algorithm::Randy),
            "group" => Ok(Algorithm::Group),
            other => Err(aid_core::Error::UnknownKeyStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaltyParams {
    pub stem: String,
    /// Salt-derivation index assigned when the identifier was created.
    pub pidx: u64,
    /// Number of current keys.
    pub count: usize,
    /// Number of next keys committed to.
    pub next_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandyParams {
    /// Key set the random keys are filed under.
    pub keyset: Uuid,
    pub count: usize,
    pub next_count: usize,
}

/// The local participant in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    /// The member's own identifier.
    pub prefix: Prefix,
    /// Parameters of the member's own identifier.
    pub params: Box<KeyParams>,
    /// The member's own rotation index.
    pub rotation_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParams {
    pub member: GroupMember,
    pub material: GroupKeyMaterial,
}

/// Strategy parameters, tagged by algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algo", rename_all = "lowercase")]
pub enum KeyParams {
    Salty(SaltyParams),
    Randy(RandyParams),
    Group(GroupParams),
}

impl KeyParams {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyParams::Salty(_) => Algorithm::Salty,
            KeyParams::Randy(_) => Algorithm::Randy,
            KeyParams::Group(_) => Algorithm::Group,
        }
    }

    /// Parameters for the next rotation: the committed next keys become
    /// current and `next_count` new keys are committed to.
    ///
    /// Group parameters are replaced wholesale by the caller and come back
    /// unchanged.
    pub fn rotated(&self, next_count: usize) -> Self {
        match self {
            KeyParams::Salty(p) => KeyParams::Salty(SaltyParams {
                count: p.next_count,
                next_count,
                ..p.clone()
            }),
            KeyParams::Randy(p) => KeyParams::Randy(RandyParams {
                count: p.next_count,
                next_count,
                ..p.clone()
            }),
            KeyParams::Group(p) => KeyParams::Group(p.clone()),
        }
    }
}

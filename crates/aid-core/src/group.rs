//! Group (multi-signer) key material.

use crate::prefix::Prefix;
use crate::state::KeyState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Keys and next digests for a group identifier, assembled from its members.
///
/// Member order fixes each member's signing index for the life of the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKeyMaterial {
    /// One current key per signing member.
    pub keys: Vec<String>,
    /// One next-key digest per rotation member.
    pub next_digests: Vec<String>,
    pub signing_members: Vec<Prefix>,
    pub rotation_members: Vec<Prefix>,
}

impl GroupKeyMaterial {
    /// Combine member states. `members` supply current keys and
    /// `rotation_members` next digests; both lists must name the same
    /// identifiers in the same order.
    pub fn resolve(members: &[KeyState], rotation_members: &[KeyState]) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::EmptyKeySet);
        }
        if members.len() != rotation_members.len() {
            return Err(Error::GroupMemberMismatch(format!(
                "{} signing members, {} rotation members",
                members.len(),
                rotation_members.len()
            )));
        }

        let mut material = Self {
            keys: Vec::with_capacity(members.len()),
            next_digests: Vec::with_capacity(members.len()),
            signing_members: Vec::with_capacity(members.len()),
            rotation_members: Vec::with_capacity(members.len()),
        };

        for (position, (member, next)) in members.iter().zip(rotation_members).enumerate() {
            if member.prefix != next.prefix {
                return Err(Error::GroupMemberMismatch(format!(
                    "position {position}: {} vs {}",
                    member.prefix, next.prefix
                )));
            }
            let key = member.current_keys.first().ok_or(Error::EmptyKeySet)?;
            let digest = next.next_key_digests.first().ok_or_else(|| {
                Error::GroupMemberMismatch(format!("{} has no next key", next.prefix))
            })?;

            material.keys.push(key.clone());
            material.next_digests.push(digest.clone());
            material.signing_members.push(member.prefix.clone());
            material.rotation_members.push(next.prefix.clone());
        }

        Ok(material)
    }

    /// Signing index of `member`, if it is one of the signing members.
    pub fn member_index(&self, member: &Prefix) -> Option<usize> {
        self.signing_members.iter().position(|m| m == member)
    }
}

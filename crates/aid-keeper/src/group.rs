//! One member's slot in a multi-signer group.

use crate::error::Result;
use crate::manager::{KeyManager, KeyStrategy, mismatch};
use crate::params::{Algorithm, GroupParams, KeyParams};
use aid_core::{Error as CoreError, IndexedSignature};

/// Keys come from the group's material. Signing goes through the local
/// member's own strategy and places its signature at the member's index.
#[derive(Debug, Default)]
pub struct GroupStrategy;

impl GroupStrategy {
    fn params<'a>(&self, params: &'a KeyParams) -> Result<&'a GroupParams> {
        match params {
            KeyParams::Group(p) => Ok(p),
            other => Err(mismatch(Algorithm::Group, other)),
        }
    }
}

impl KeyStrategy for GroupStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Group
    }

    fn keys(&self, params: &KeyParams, _ridx: u64) -> Result<Vec<String>> {
        Ok(self.params(params)?.material.keys.clone())
    }

    fn next_digests(&self, params: &KeyParams, _ridx: u64) -> Result<Vec<String>> {
        Ok(self.params(params)?.material.next_digests.clone())
    }

    fn sign(
        &self,
        manager: &dyn KeyManager,
        message: &[u8],
        params: &KeyParams,
        _ridx: u64,
    ) -> Result<Vec<IndexedSignature>> {
        let p = self.params(params)?;
        let index = p.material.member_index(&p.member.prefix).ok_or_else(|| {
            CoreError::GroupMemberMismatch(format!("{} is not a signing member", p.member.prefix))
        })?;

        let own = manager.sign(message, &p.member.params, p.member.rotation_index)?;
        let signature = own
            .into_iter()
            .find(|s| s.index == 0)
            .ok_or(CoreError::InvalidSignature)?;

        Ok(vec![IndexedSignature {
            index,
            signature: signature.signature,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;
    use crate::params::{GroupMember, SaltyParams};
    use crate::salty::SaltyStrategy;
    use aid_core::keys::key_digest;
    use aid_core::{GroupKeyMaterial, KeyConfig, KeyState, Said, Threshold};

    fn salty(pidx: u64) -> KeyParams {
        KeyParams::Salty(SaltyParams {
            stem: "group-test".into(),
            pidx,
            count: 1,
            next_count: 1,
        })
    }

    fn member_state(manager: &Manager, params: &KeyParams, name: &str) -> KeyState {
        KeyState::initial(
            Said::digest(name.as_bytes()),
            KeyConfig {
                keys: manager.keys(params, 0).unwrap(),
                next_digests: manager.next_digests(params, 0).unwrap(),
                current_threshold: Threshold::Simple(1),
                next_threshold: Threshold::Simple(1),
            },
            vec![],
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_group_signs_member_slot() {
        let manager = Manager::new()
            .with(SaltyStrategy::new(b"salt".to_vec()))
            .with(GroupStrategy);

        let (p0, p1) = (salty(0), salty(1));
        let states = vec![
            member_state(&manager, &p0, "m0"),
            member_state(&manager, &p1, "m1"),
        ];
        let material = GroupKeyMaterial::resolve(&states, &states).unwrap();

        let group = KeyParams::Group(GroupParams {
            member: GroupMember {
                prefix: states[1].prefix.clone(),
                params: Box::new(p1),
                rotation_index: 0,
            },
            material: material.clone(),
        });

        assert_eq!(manager.keys(&group, 0).unwrap(), material.keys);
        assert_eq!(
            manager.next_digests(&group, 0).unwrap()[1],
            key_digest(&manager.keys(&salty(1).rotated(1), 1).unwrap()[0]).to_string()
        );

        let sigs = manager.sign(b"group event", &group, 0).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].index, 1);
        sigs[0].verify(&material.keys[1], b"group event").unwrap();
    }

    #[test]
    fn test_non_member_cannot_sign() {
        let manager = Manager::new()
            .with(SaltyStrategy::new(b"salt".to_vec()))
            .with(GroupStrategy);
        let p0 = salty(0);
        let states = vec![member_state(&manager, &p0, "m0")];
        let material = GroupKeyMaterial::resolve(&states, &states).unwrap();

        let group = KeyParams::Group(GroupParams {
            member: GroupMember {
                prefix: Said::digest(b"outsider"),
                params: Box::new(p0),
                rotation_index: 0,
            },
            material,
        });
        assert!(manager.sign(b"msg", &group, 0).is_err());
    }
}

//! Randomly generated keys.
//!
//! Keys are generated the first time a `(key set, rotation)` pair is asked for
//! and kept in memory. [`RandyStrategy::export`] and [`RandyStrategy::import`]
//! move them in and out of persistent storage.

use crate::error::{KeeperError, Result};
use crate::manager::{KeyManager, KeyStrategy, mismatch};
use crate::params::{Algorithm, KeyParams, RandyParams};
use aid_core::IndexedSignature;
use aid_core::keys::{encode_key, key_digest};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Serialized key set for one rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeySet {
    pub keyset: Uuid,
    pub rotation_index: u64,
    /// Hex-encoded Ed25519 seeds, in signing order.
    pub seeds: Vec<String>,
}

#[derive(Default)]
pub struct RandyStrategy {
    sets: RwLock<HashMap<(Uuid, u64), Vec<SigningKey>>>,
}

impl RandyStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore key sets written by [`RandyStrategy::export`].
    pub fn import(stored: &[StoredKeySet]) -> Result<Self> {
        let mut sets = HashMap::new();
        for set in stored {
            let signers = set
                .seeds
                .iter()
                .map(|seed| decode_seed(seed, set.keyset))
                .collect::<Result<Vec<_>>>()?;
            sets.insert((set.keyset, set.rotation_index), signers);
        }
        Ok(Self {
            sets: RwLock::new(sets),
        })
    }

    /// All key sets generated so far.
    pub fn export(&self) -> Vec<StoredKeySet> {
        let sets = self.sets.read().unwrap();
        let mut stored: Vec<StoredKeySet> = sets
            .iter()
            .map(|((keyset, ridx), signers)| StoredKeySet {
                keyset: *keyset,
                rotation_index: *ridx,
                seeds: signers.iter().map(|s| hex::encode(s.to_bytes())).collect(),
            })
            .collect();
        stored.sort_by_key(|s| (s.keyset, s.rotation_index));
        stored
    }

    fn params<'a>(&self, params: &'a KeyParams) -> Result<&'a RandyParams> {
        match params {
            KeyParams::Randy(p) => Ok(p),
            other => Err(mismatch(Algorithm::Randy, other)),
        }
    }

    /// Public keys of the set at `ridx`, generating `count` keys if the set
    /// does not exist yet.
    fn with_set<T>(
        &self,
        keyset: Uuid,
        ridx: u64,
        count: usize,
        f: impl FnOnce(&[SigningKey]) -> T,
    ) -> T {
        if let Some(set) = self.sets.read().unwrap().get(&(keyset, ridx)) {
            return f(set);
        }

        let mut sets = self.sets.write().unwrap();
        let set = sets.entry((keyset, ridx)).or_insert_with(|| {
            tracing::debug!(%keyset, ridx, count, "generating random key set");
            (0..count).map(|_| SigningKey::generate(&mut OsRng)).collect()
        });
        f(set)
    }
}

impl KeyStrategy for RandyStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Randy
    }

    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        let p = self.params(params)?;
        Ok(self.with_set(p.keyset, ridx, p.count, |set| {
            set.iter().map(|s| encode_key(&s.verifying_key())).collect()
        }))
    }

    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        let p = self.params(params)?;
        Ok(self.with_set(p.keyset, ridx + 1, p.next_count, |set| {
            set.iter()
                .map(|s| key_digest(&encode_key(&s.verifying_key())).to_string())
                .collect()
        }))
    }

    fn sign(
        &self,
        _manager: &dyn KeyManager,
        message: &[u8],
        params: &KeyParams,
        ridx: u64,
    ) -> Result<Vec<IndexedSignature>> {
        let p = self.params(params)?;
        Ok(self.with_set(p.keyset, ridx, p.count, |set| {
            set.iter()
                .enumerate()
                .map(|(i, s)| IndexedSignature::sign(i, s, message))
                .collect()
        }))
    }
}

fn decode_seed(seed: &str, keyset: Uuid) -> Result<SigningKey> {
    let bytes: [u8; 32] = hex::decode(seed)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| KeeperError::MalformedKeySet(keyset.to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Manager;

    fn params(count: usize, next_count: usize) -> KeyParams {
        KeyParams::Randy(RandyParams {
            keyset: Uuid::now_v7(),
            count,
            next_count,
        })
    }

    #[test]
    fn test_keys_stable_once_generated() {
        let s = RandyStrategy::new();
        let p = params(2, 1);
        assert_eq!(s.keys(&p, 0).unwrap(), s.keys(&p, 0).unwrap());
        assert_eq!(s.keys(&p, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_next_digests_match_rotated_keys() {
        let s = RandyStrategy::new();
        let p = params(1, 2);

        let digests = s.next_digests(&p, 0).unwrap();
        let revealed: Vec<String> = s
            .keys(&p.rotated(1), 1)
            .unwrap()
            .iter()
            .map(|k| key_digest(k).to_string())
            .collect();
        assert_eq!(digests, revealed);
    }

    #[test]
    fn test_export_import() {
        let s = RandyStrategy::new();
        let p = params(1, 1);
        let keys = s.keys(&p, 0).unwrap();
        s.next_digests(&p, 0).unwrap();

        let stored = s.export();
        assert_eq!(stored.len(), 2);

        let restored = RandyStrategy::import(&stored).unwrap();
        assert_eq!(restored.keys(&p, 0).unwrap(), keys);

        let manager = Manager::new().with(restored);
        let sigs = manager.sign(b"msg", &p, 0).unwrap();
        sigs[0].verify(&keys[0], b"msg").unwrap();
    }

    #[test]
    fn test_import_rejects_bad_seed() {
        let stored = vec![StoredKeySet {
            keyset: Uuid::now_v7(),
            rotation_index: 0,
            seeds: vec!["abcd".into()],
        }];
        assert!(matches!(
            RandyStrategy::import(&stored),
            Err(KeeperError::MalformedKeySet(_))
        ));
    }
}

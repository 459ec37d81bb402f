//! Deterministic keys derived from a secret salt.

use crate::error::{KeeperError, Result};
use crate::manager::{KeyManager, KeyStrategy, mismatch};
use crate::params::{Algorithm, KeyParams, SaltyParams};
use aid_core::IndexedSignature;
use aid_core::keys::{encode_key, key_digest};
use ed25519_dalek::SigningKey;
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

/// Length of a generated salt.
pub const SALT_LENGTH: usize = 16;

/// Derives key `k` of rotation `r` as HKDF-SHA256 over the salt, with the
/// path `{stem}:{pidx:x}:{r:x}:{k:x}` as info.
pub struct SaltyStrategy {
    salt: Vec<u8>,
}

impl SaltyStrategy {
    pub fn new(salt: Vec<u8>) -> Self {
        Self { salt }
    }

    /// A fresh random salt.
    pub fn random_salt() -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    fn params<'a>(&self, params: &'a KeyParams) -> Result<&'a SaltyParams> {
        match params {
            KeyParams::Salty(p) => Ok(p),
            other => Err(mismatch(Algorithm::Salty, other)),
        }
    }

    fn signer(&self, params: &SaltyParams, ridx: u64, kidx: usize) -> Result<SigningKey> {
        let path = format!("{}:{:x}:{:x}:{:x}", params.stem, params.pidx, ridx, kidx);
        let hkdf = Hkdf::<Sha256>::new(None, &self.salt);

        let mut seed = [0u8; 32];
        hkdf.expand(path.as_bytes(), &mut seed)
            .map_err(|e| KeeperError::Derivation(e.to_string()))?;
        Ok(SigningKey::from_bytes(&seed))
    }

    fn signers(&self, params: &SaltyParams, ridx: u64, count: usize) -> Result<Vec<SigningKey>> {
        (0..count).map(|k| self.signer(params, ridx, k)).collect()
    }
}

impl KeyStrategy for SaltyStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Salty
    }

    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        let p = self.params(params)?;
        Ok(self
            .signers(p, ridx, p.count)?
            .iter()
            .map(|s| encode_key(&s.verifying_key()))
            .collect())
    }

    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        let p = self.params(params)?;
        Ok(self
            .signers(p, ridx + 1, p.next_count)?
            .iter()
            .map(|s| key_digest(&encode_key(&s.verifying_key())).to_string())
            .collect())
    }

    fn sign(
        &self,
        _manager: &dyn KeyManager,
        message: &[u8],
        params: &KeyParams,
        ridx: u64,
    ) -> Result<Vec<IndexedSignature>> {
        let p = self.params(params)?;
        Ok(self
            .signers(p, ridx, p.count)?
            .iter()
            .enumerate()
            .map(|(i, s)| IndexedSignature::sign(i, s, message))
            .collect())
    }
}

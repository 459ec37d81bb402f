//! Textual encodings for public keys and signatures.
//!
//! Keys travel inside events as `ed25519:<base58(public key)>` and signatures
//! as base64 of the 64-byte Ed25519 signature.

use crate::prefix::Said;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Key type code.
pub const KEY_CODE: &str = "ed25519:";

/// Encode a verifying key for use in an event.
pub fn encode_key(key: &VerifyingKey) -> String {
    format!("{}{}", KEY_CODE, bs58::encode(key.as_bytes()).into_string())
}

/// Decode a key written by [`encode_key`].
pub fn decode_key(text: &str) -> Result<VerifyingKey> {
    let encoded = text
        .strip_prefix(KEY_CODE)
        .ok_or_else(|| Error::InvalidKey(format!("must start with '{KEY_CODE}'")))?;

    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::InvalidKey(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(Error::InvalidKey(format!(
            "public key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);
    VerifyingKey::from_bytes(&key_bytes).map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Digest committing to a next key, computed over its textual form.
pub fn key_digest(key: &str) -> Said {
    Said::digest(key.as_bytes())
}

/// A detached signature bound to the position of its key in the signing key list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    /// Index of the signing key.
    pub index: usize,
    /// Base64 Ed25519 signature.
    pub signature: String,
}

impl IndexedSignature {
    /// Sign `message` with `key`, recording `index`.
    pub fn sign(index: usize, key: &SigningKey, message: &[u8]) -> Self {
        Self {
            index,
            signature: STANDARD.encode(key.sign(message).to_bytes()),
        }
    }

    /// Verify against the textual key at this signature's index.
    pub fn verify(&self, key: &str, message: &[u8]) -> Result<()> {
        let public_key = decode_key(key)?;
        let bytes = STANDARD
            .decode(&self.signature)
            .map_err(|_| Error::InvalidSignature)?;
        let signature =
            Signature::from_bytes(&bytes.try_into().map_err(|_| Error::InvalidSignature)?);

        public_key
            .verify(message, &signature)
            .map_err(|_| Error::InvalidSignature)
    }
}

//! Signature and pre-rotation checks.

use crate::keys::{IndexedSignature, key_digest};
use crate::threshold::Threshold;
use crate::{Error, Result};
use std::collections::BTreeSet;

/// Verify indexed signatures over `message` and check that the signing
/// indices satisfy `threshold`. Returns the verified indices.
pub fn verify_signatures(
    message: &[u8],
    keys: &[String],
    threshold: &Threshold,
    signatures: &[IndexedSignature],
) -> Result<BTreeSet<usize>> {
    let mut verified = BTreeSet::new();
    for sig in signatures {
        let key = keys.get(sig.index).ok_or(Error::InvalidSignature)?;
        sig.verify(key, message)?;
        verified.insert(sig.index);
    }

    if !threshold.is_satisfied_by(&verified) {
        return Err(Error::InsufficientSignatures(verified.into_iter().collect()));
    }
    Ok(verified)
}

/// Check that `keys` reveal every digest committed in `next_digests`.
pub fn verify_prior_commitment(next_digests: &[String], keys: &[String]) -> Result<()> {
    if next_digests.is_empty() {
        return Err(Error::NonTransferable("no next keys committed".into()));
    }

    let revealed: BTreeSet<String> = keys.iter().map(|k| key_digest(k).to_string()).collect();
    match next_digests.iter().find(|d| !revealed.contains(*d)) {
        Some(missing) => Err(Error::DigestMismatch(format!(
            "no key revealed for committed digest {missing}"
        ))),
        None => Ok(()),
    }
}

/// Check that the keys behind the `signers` indices, located by digest among
/// the prior `next_digests`, satisfy the prior `next_threshold`.
pub fn verify_next_threshold(
    next_digests: &[String],
    next_threshold: &Threshold,
    keys: &[String],
    signers: &BTreeSet<usize>,
) -> Result<()> {
    let positions: BTreeSet<usize> = signers
        .iter()
        .filter_map(|&i| keys.get(i))
        .filter_map(|key| {
            let digest = key_digest(key).to_string();
            next_digests.iter().position(|d| *d == digest)
        })
        .collect();

    if !next_threshold.is_satisfied_by(&positions) {
        return Err(Error::InsufficientSignatures(positions.into_iter().collect()));
    }
    Ok(())
}

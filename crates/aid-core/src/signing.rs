//! Event codec: deterministic serialization and self-addressing digests.

use crate::prefix::Said;
use crate::{Error, Result};
use serde::Serialize;

/// Protocol and encoding tag at the head of every version string.
pub const VERSION_PROTOCOL: &str = "AID10JSON";

/// Length of a version string (`AID10JSON` + 6 hex size digits + `_`).
pub const VERSION_LENGTH: usize = VERSION_PROTOCOL.len() + 7;

/// An event body that carries a version string and self-addressing fields.
pub trait SelfAddressing: Serialize {
    /// The `v` field.
    fn version_mut(&mut self) -> &mut String;

    /// The fields that hold the body's own digest (`d`, and `i` on inception).
    fn digest_fields(&mut self) -> Vec<&mut String>;
}

/// Serialize a value into the byte form that is digested and signed.
///
/// Struct fields keep their declaration order; map keys inside seals are
/// ordered by serde_json's map type.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Version string for a body of `size` bytes.
pub fn version_string(size: usize) -> String {
    format!("{VERSION_PROTOCOL}{size:06x}_")
}

/// Fill in the version string and self-addressing digest of `body`.
///
/// The digest is taken over the body with every digest field set to a
/// placeholder of the digest's length, so the final size does not change.
pub fn saidify<B: SelfAddressing>(body: &mut B) -> Result<Said> {
    for field in body.digest_fields() {
        *field = Said::placeholder();
    }
    *body.version_mut() = version_string(0);
    let size = canonicalize(body)?.len();
    *body.version_mut() = version_string(size);

    let said = Said::digest(&canonicalize(body)?);
    for field in body.digest_fields() {
        *field = said.to_string();
    }
    Ok(said)
}

/// Recompute the digest of `body` and check it against the stored fields and
/// the version string.
pub fn verify_said<B: SelfAddressing + Clone>(body: &B) -> Result<Said> {
    let mut original = body.clone();
    let stored: Vec<String> = original.digest_fields().iter().map(|f| f.to_string()).collect();
    let stored_version = original.version_mut().clone();

    let mut copy = body.clone();
    let said = saidify(&mut copy)?;

    if stored.iter().any(|d| *d != said.to_string()) {
        return Err(Error::DigestMismatch(format!("computed {said}, stored {stored:?}")));
    }
    if *copy.version_mut() != stored_version {
        return Err(Error::DigestMismatch(format!(
            "version {stored_version} does not match body size"
        )));
    }
    Ok(said)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize)]
    struct Body {
        v: String,
        d: String,
        x: u32,
    }

    impl SelfAddressing for Body {
        fn version_mut(&mut self) -> &mut String {
            &mut self.v
        }

        fn digest_fields(&mut self) -> Vec<&mut String> {
            vec![&mut self.d]
        }
    }

    fn body() -> Body {
        Body {
            v: String::new(),
            d: String::new(),
            x: 7,
        }
    }

    #[test]
    fn test_field_order_preserved() {
        let canonical = canonicalize(&body()).unwrap();
        assert_eq!(canonical, br#"{"v":"","d":"","x":7}"#);
    }

    #[test]
    fn test_map_keys_ordered() {
        let value = json!({"b": 2, "a": 1});
        assert_eq!(canonicalize(&value).unwrap(), br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_version_string_size() {
        let mut b = body();
        saidify(&mut b).unwrap();
        let size = canonicalize(&b).unwrap().len();
        assert_eq!(b.v, version_string(size));
        assert_eq!(b.v.len(), VERSION_LENGTH);
    }

    #[test]
    fn test_saidify_deterministic() {
        let mut a = body();
        let mut b = body();
        assert_eq!(saidify(&mut a).unwrap(), saidify(&mut b).unwrap());
        assert_eq!(a.d, b.d);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut b = body();
        saidify(&mut b).unwrap();
        verify_said(&b).unwrap();

        b.x = 8;
        assert!(matches!(verify_said(&b), Err(Error::DigestMismatch(_))));
    }
}

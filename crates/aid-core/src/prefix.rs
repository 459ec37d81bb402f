//! Self-addressing digests and identifier prefixes.
//!
//! Format: `sha256:<hex(sha256(bytes))>`

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Digest code prefix.
pub const SAID_CODE: &str = "sha256:";

/// Length of a textual digest (code plus 64 hex characters).
pub const SAID_LENGTH: usize = SAID_CODE.len() + 64;

/// A self-addressing digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Said {
    digest: [u8; 32],
}

/// An identifier prefix. Every prefix here is the digest of its inception event.
pub type Prefix = Said;

impl Said {
    /// Digest raw bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self {
            digest: Sha256::digest(bytes).into(),
        }
    }

    /// The placeholder written into digest fields before hashing.
    pub fn placeholder() -> String {
        "#".repeat(SAID_LENGTH)
    }

    /// Get the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl fmt::Display for Said {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SAID_CODE, hex::encode(self.digest))
    }
}

impl FromStr for Said {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(SAID_CODE)
            .ok_or_else(|| Error::InvalidPrefix(format!("must start with '{SAID_CODE}'")))?;

        let bytes = hex::decode(hex_part).map_err(|e| Error::InvalidPrefix(e.to_string()))?;
        let digest: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidPrefix(format!("digest must be 32 bytes, got {}", b.len()))
        })?;

        Ok(Self { digest })
    }
}

impl Serialize for Said {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Said {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_said_roundtrip() {
        let said = Said::digest(b"hello");
        let text = said.to_string();
        assert_eq!(text.len(), SAID_LENGTH);
        assert!(text.starts_with("sha256:"));

        let parsed: Said = text.parse().unwrap();
        assert_eq!(said, parsed);
    }

    #[test]
    fn test_placeholder_length() {
        assert_eq!(Said::placeholder().len(), Said::digest(b"").to_string().len());
    }

    #[test]
    fn test_invalid_said() {
        assert!("blake3:00".parse::<Said>().is_err());
        assert!("sha256:zz".parse::<Said>().is_err());
        assert!("sha256:00ff".parse::<Said>().is_err());
    }
}

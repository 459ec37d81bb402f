//! Key event bodies.
//!
//! Field labels and their order are part of the signed form: bodies serialize
//! in declaration order with the short labels below.

use crate::prefix::Said;
use crate::signing::{self, SelfAddressing};
use crate::threshold::Threshold;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Event type tag (`t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ilk {
    /// Inception.
    Icp,
    /// Delegated inception.
    Dip,
    /// Rotation.
    Rot,
    /// Interaction.
    Ixn,
    /// Reply.
    Rpy,
}

impl fmt::Display for Ilk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Ilk::Icp => "icp",
            Ilk::Dip => "dip",
            Ilk::Rot => "rot",
            Ilk::Ixn => "ixn",
            Ilk::Rpy => "rpy",
        };
        f.write_str(tag)
    }
}

/// Roles an endpoint can be authorized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Witness,
    Registrar,
    Watcher,
    Judge,
    Juror,
    Peer,
    Mailbox,
    Agent,
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| Error::UnknownRole(s.to_string()))
    }
}

/// Inception (`icp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InceptionEvent {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "t")]
    pub ilk: Ilk,
    #[serde(rename = "d")]
    pub digest: String,
    #[serde(rename = "i")]
    pub prefix: String,
    #[serde(rename = "s", with = "hex_num")]
    pub sn: u64,
    #[serde(rename = "kt")]
    pub current_threshold: Threshold,
    #[serde(rename = "k")]
    pub keys: Vec<String>,
    #[serde(rename = "nt")]
    pub next_threshold: Threshold,
    #[serde(rename = "n")]
    pub next_digests: Vec<String>,
    #[serde(rename = "bt", with = "hex_num")]
    pub toad: u64,
    #[serde(rename = "b")]
    pub witnesses: Vec<String>,
    /// Configuration traits.
    #[serde(rename = "c")]
    pub traits: Vec<String>,
    #[serde(rename = "a")]
    pub seals: Vec<Value>,
}

/// Delegated inception (`dip`): an inception that also names its delegator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedInceptionEvent {
    #[serde(flatten)]
    pub inception: InceptionEvent,
    #[serde(rename = "di")]
    pub delegator: String,
}

/// Rotation (`rot`). Witness changes are carried as cuts and adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationEvent {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "t")]
    pub ilk: Ilk,
    #[serde(rename = "d")]
    pub digest: String,
    #[serde(rename = "i")]
    pub prefix: String,
    #[serde(rename = "s", with = "hex_num")]
    pub sn: u64,
    #[serde(rename = "p")]
    pub prior: String,
    #[serde(rename = "kt")]
    pub current_threshold: Threshold,
    #[serde(rename = "k")]
    pub keys: Vec<String>,
    #[serde(rename = "nt")]
    pub next_threshold: Threshold,
    #[serde(rename = "n")]
    pub next_digests: Vec<String>,
    #[serde(rename = "bt", with = "hex_num")]
    pub toad: u64,
    #[serde(rename = "br")]
    pub cuts: Vec<String>,
    #[serde(rename = "ba")]
    pub adds: Vec<String>,
    #[serde(rename = "a")]
    pub seals: Vec<Value>,
}

/// Interaction (`ixn`): anchors seals without changing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "t")]
    pub ilk: Ilk,
    #[serde(rename = "d")]
    pub digest: String,
    #[serde(rename = "i")]
    pub prefix: String,
    #[serde(rename = "s", with = "hex_num")]
    pub sn: u64,
    #[serde(rename = "p")]
    pub prior: String,
    #[serde(rename = "a")]
    pub seals: Vec<Value>,
}

/// Payload of an end-role reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndRole {
    /// Controller identifier.
    pub cid: String,
    pub role: Role,
    /// Endpoint identifier; absent when the role is being cut.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eid: Option<String>,
}

/// Reply (`rpy`): a standalone signed statement outside the key event chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEvent {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "t")]
    pub ilk: Ilk,
    #[serde(rename = "d")]
    pub digest: String,
    /// RFC 3339 issue time.
    #[serde(rename = "dt")]
    pub issued_at: String,
    #[serde(rename = "r")]
    pub route: String,
    #[serde(rename = "a")]
    pub data: EndRole,
}

impl SelfAddressing for InceptionEvent {
    fn version_mut(&mut self) -> &mut String {
        &mut self.version
    }

    fn digest_fields(&mut self) -> Vec<&mut String> {
        vec![&mut self.digest, &mut self.prefix]
    }
}

impl SelfAddressing for DelegatedInceptionEvent {
    fn version_mut(&mut self) -> &mut String {
        &mut self.inception.version
    }

    fn digest_fields(&mut self) -> Vec<&mut String> {
        self.inception.digest_fields()
    }
}

impl SelfAddressing for RotationEvent {
    fn version_mut(&mut self) -> &mut String {
        &mut self.version
    }

    fn digest_fields(&mut self) -> Vec<&mut String> {
        vec![&mut self.digest]
    }
}

impl SelfAddressing for InteractionEvent {
    fn version_mut(&mut self) -> &mut String {
        &mut self.version
    }

    fn digest_fields(&mut self) -> Vec<&mut String> {
        vec![&mut self.digest]
    }
}

impl SelfAddressing for ReplyEvent {
    fn version_mut(&mut self) -> &mut String {
        &mut self.version
    }

    fn digest_fields(&mut self) -> Vec<&mut String> {
        vec![&mut self.digest]
    }
}

/// A constructed event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Inception(InceptionEvent),
    DelegatedInception(DelegatedInceptionEvent),
    Rotation(RotationEvent),
    Interaction(InteractionEvent),
    Reply(ReplyEvent),
}

impl Event {
    /// Event type tag.
    pub fn ilk(&self) -> Ilk {
        match self {
            Event::Inception(_) => Ilk::Icp,
            Event::DelegatedInception(_) => Ilk::Dip,
            Event::Rotation(_) => Ilk::Rot,
            Event::Interaction(_) => Ilk::Ixn,
            Event::Reply(_) => Ilk::Rpy,
        }
    }

    /// Identifier prefix the event belongs to. Replies name it as `cid`.
    pub fn prefix(&self) -> &str {
        match self {
            Event::Inception(e) => &e.prefix,
            Event::DelegatedInception(e) => &e.inception.prefix,
            Event::Rotation(e) => &e.prefix,
            Event::Interaction(e) => &e.prefix,
            Event::Reply(e) => &e.data.cid,
        }
    }

    /// Sequence number, for key events.
    pub fn sn(&self) -> Option<u64> {
        match self {
            Event::Inception(e) => Some(e.sn),
            Event::DelegatedInception(e) => Some(e.inception.sn),
            Event::Rotation(e) => Some(e.sn),
            Event::Interaction(e) => Some(e.sn),
            Event::Reply(_) => None,
        }
    }

    /// The stored self-addressing digest.
    pub fn digest(&self) -> Result<Said> {
        let digest = match self {
            Event::Inception(e) => &e.digest,
            Event::DelegatedInception(e) => &e.inception.digest,
            Event::Rotation(e) => &e.digest,
            Event::Interaction(e) => &e.digest,
            Event::Reply(e) => &e.digest,
        };
        digest.parse()
    }

    /// Bytes to digest and sign.
    pub fn canonicalize(&self) -> Result<Vec<u8>> {
        signing::canonicalize(self)
    }

    /// Check the stored digest against the body.
    pub fn verify_digest(&self) -> Result<Said> {
        match self {
            Event::Inception(e) => signing::verify_said(e),
            Event::DelegatedInception(e) => signing::verify_said(e),
            Event::Rotation(e) => signing::verify_said(e),
            Event::Interaction(e) => signing::verify_said(e),
            Event::Reply(e) => signing::verify_said(e),
        }
    }

    /// Whether the event establishes or changes keys.
    pub fn is_establishment(&self) -> bool {
        matches!(
            self,
            Event::Inception(_) | Event::DelegatedInception(_) | Event::Rotation(_)
        )
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Event::Inception(e) => e.serialize(serializer),
            Event::DelegatedInception(e) => e.serialize(serializer),
            Event::Rotation(e) => e.serialize(serializer),
            Event::Interaction(e) => e.serialize(serializer),
            Event::Reply(e) => e.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;

        let value = Value::deserialize(deserializer)?;
        let ilk: Ilk = value
            .get("t")
            .cloned()
            .ok_or_else(|| D::Error::missing_field("t"))
            .and_then(|t| serde_json::from_value(t).map_err(D::Error::custom))?;

        let event = match ilk {
            Ilk::Icp => serde_json::from_value(value).map(Event::Inception),
            Ilk::Dip => serde_json::from_value(value).map(Event::DelegatedInception),
            Ilk::Rot => serde_json::from_value(value).map(Event::Rotation),
            Ilk::Ixn => serde_json::from_value(value).map(Event::Interaction),
            Ilk::Rpy => serde_json::from_value(value).map(Event::Reply),
        };
        event.map_err(D::Error::custom)
    }
}

/// Integers written as lowercase hex strings.
pub(crate) mod hex_num {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        u64::from_str_radix(&s, 16).map_err(serde::de::Error::custom)
    }
}

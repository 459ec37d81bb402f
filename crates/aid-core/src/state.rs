//! Key state: the control configuration of an identifier at one point in its
//! event sequence.
//!
//! A state is never changed in place. Every accepted event derives a new one.

use crate::event::Event;
use crate::prefix::{Prefix, Said};
use crate::threshold::Threshold;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Keys, commitments and thresholds established by an inception or rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyConfig {
    /// Current signing keys, in signing-index order.
    pub keys: Vec<String>,
    /// Digests of the next key set.
    pub next_digests: Vec<String>,
    /// Threshold over `keys`.
    pub current_threshold: Threshold,
    /// Threshold over the keys behind `next_digests`.
    pub next_threshold: Threshold,
}

impl KeyConfig {
    /// Check key counts against the thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(Error::EmptyKeySet);
        }
        self.current_threshold.validate(self.keys.len())?;
        self.next_threshold.validate(self.next_digests.len())
    }
}

/// Witness changes requested by a rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessDelta {
    /// Witnesses to remove.
    pub cuts: Vec<String>,
    /// Witnesses to add.
    pub adds: Vec<String>,
}

impl WitnessDelta {
    pub fn new(cuts: Vec<String>, adds: Vec<String>) -> Self {
        Self { cuts, adds }
    }

    /// Apply the delta to `current`: cuts are removed, then adds are appended
    /// in order.
    ///
    /// A witness may be cut and re-added in the same delta; it then moves to
    /// the end of the list.
    pub fn apply(&self, current: &[String]) -> Result<Vec<String>> {
        ensure_unique(&self.cuts, "cuts")?;
        ensure_unique(&self.adds, "adds")?;

        if let Some(missing) = self.cuts.iter().find(|cut| !current.contains(*cut)) {
            return Err(Error::InvalidWitnessOp(format!(
                "cannot cut {missing}: not a current witness"
            )));
        }

        let mut witnesses: Vec<String> = current
            .iter()
            .filter(|w| !self.cuts.contains(*w))
            .cloned()
            .collect();

        for add in &self.adds {
            if witnesses.contains(add) {
                return Err(Error::InvalidWitnessOp(format!(
                    "cannot add {add}: already a witness"
                )));
            }
            witnesses.push(add.clone());
        }

        Ok(witnesses)
    }
}

/// Weak "ample" witness threshold for `n` witnesses: enough receipts that two
/// conflicting events cannot both be receipted while at most `f` witnesses
/// are faulty.
pub fn ample(n: usize) -> u64 {
    if n == 0 {
        return 0;
    }
    let f1 = ((n - 1) / 3).max(1);
    let f2 = (n - 1).div_ceil(3).max(1);
    n.min((n + f1 + 1).div_ceil(2))
        .min((n + f2 + 1).div_ceil(2)) as u64
}

/// Witness threshold for `witness_count` witnesses: the supplied value if it
/// fits, or [`ample`] when omitted.
pub fn resolve_toad(toad: Option<u64>, witness_count: usize) -> Result<u64> {
    match toad {
        Some(toad) if toad > witness_count as u64 => Err(Error::ToadExceedsWitnessCount {
            toad,
            witnesses: witness_count,
        }),
        Some(toad) => Ok(toad),
        None => Ok(ample(witness_count)),
    }
}

/// Reject duplicate witness identifiers.
pub fn ensure_unique(witnesses: &[String], label: &str) -> Result<()> {
    let mut seen = HashSet::new();
    match witnesses.iter().find(|w| !seen.insert(w.as_str())) {
        Some(dup) => Err(Error::InvalidWitnessOp(format!("duplicate {dup} in {label}"))),
        None => Ok(()),
    }
}

/// Authoritative snapshot of an identifier's control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyState {
    /// Identifier prefix, fixed at inception.
    pub prefix: Prefix,
    /// Sequence number of the last accepted event.
    pub sequence_number: u64,
    /// Number of establishment events after inception.
    pub rotation_index: u64,
    /// Current signing keys.
    pub current_keys: Vec<String>,
    /// Pre-rotation commitments to the next keys.
    pub next_key_digests: Vec<String>,
    pub current_threshold: Threshold,
    pub next_threshold: Threshold,
    pub witnesses: Vec<String>,
    /// Witness receipt threshold.
    pub toad: u64,
    /// Digest of the last accepted event; the next event chains to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_event_digest: Option<Said>,
    /// Delegating identifier, for delegated identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegator: Option<Prefix>,
}

impl KeyState {
    /// State established by an inception, before its digest is recorded.
    pub fn initial(
        prefix: Prefix,
        config: KeyConfig,
        witnesses: Vec<String>,
        toad: u64,
    ) -> Result<Self> {
        config.validate()?;
        ensure_unique(&witnesses, "witnesses")?;
        let toad = resolve_toad(Some(toad), witnesses.len())?;

        Ok(Self {
            prefix,
            sequence_number: 0,
            rotation_index: 0,
            current_keys: config.keys,
            next_key_digests: config.next_digests,
            current_threshold: config.current_threshold,
            next_threshold: config.next_threshold,
            witnesses,
            toad,
            prior_event_digest: None,
            delegator: None,
        })
    }

    /// Set the delegator.
    pub fn with_delegator(mut self, delegator: Prefix) -> Self {
        self.delegator = Some(delegator);
        self
    }

    /// Record the digest of the event this state was derived from.
    pub fn accepted(mut self, event_digest: Said) -> Self {
        self.prior_event_digest = Some(event_digest);
        self
    }

    /// Whether the identifier has committed to next keys.
    pub fn is_transferable(&self) -> bool {
        !self.next_key_digests.is_empty()
    }

    /// Current key configuration.
    pub fn key_config(&self) -> KeyConfig {
        KeyConfig {
            keys: self.current_keys.clone(),
            next_digests: self.next_key_digests.clone(),
            current_threshold: self.current_threshold.clone(),
            next_threshold: self.next_threshold.clone(),
        }
    }

    /// State after a rotation. Keys, commitments, thresholds and witnesses are
    /// replaced wholesale; both counters advance.
    pub fn apply_rotation(
        &self,
        config: KeyConfig,
        delta: &WitnessDelta,
        toad: Option<u64>,
        event_digest: Said,
    ) -> Result<Self> {
        config.validate()?;
        let witnesses = delta.apply(&self.witnesses)?;
        let toad = resolve_toad(toad, witnesses.len())?;

        Ok(Self {
            prefix: self.prefix.clone(),
            sequence_number: self.sequence_number + 1,
            rotation_index: self.rotation_index + 1,
            current_keys: config.keys,
            next_key_digests: config.next_digests,
            current_threshold: config.current_threshold,
            next_threshold: config.next_threshold,
            witnesses,
            toad,
            prior_event_digest: Some(event_digest),
            delegator: self.delegator.clone(),
        })
    }

    /// State after an interaction: only the sequence number and the chaining
    /// digest change.
    pub fn apply_interaction(&self, event_digest: Said) -> Self {
        Self {
            sequence_number: self.sequence_number + 1,
            prior_event_digest: Some(event_digest),
            ..self.clone()
        }
    }

    /// State established by an inception or delegated inception event.
    pub fn from_inception(event: &Event) -> Result<Self> {
        let (body, delegator) = match event {
            Event::Inception(icp) => (icp, None),
            Event::DelegatedInception(dip) => (&dip.inception, Some(dip.delegator.parse::<Prefix>()?)),
            other => return Err(Error::NotEstablished(other.ilk().to_string())),
        };

        if body.sn != 0 {
            return Err(Error::SequenceMismatch {
                expected: 0,
                got: body.sn,
            });
        }

        let digest = event.digest()?;
        let config = KeyConfig {
            keys: body.keys.clone(),
            next_digests: body.next_digests.clone(),
            current_threshold: body.current_threshold.clone(),
            next_threshold: body.next_threshold.clone(),
        };

        let state =
            KeyState::initial(body.prefix.parse()?, config, body.witnesses.clone(), body.toad)?
                .accepted(digest);
        Ok(match delegator {
            Some(delegator) => state.with_delegator(delegator),
            None => state,
        })
    }

    /// State after a rotation or interaction event, checking that it chains
    /// onto this state.
    pub fn apply(&self, event: &Event) -> Result<Self> {
        let (prefix, sn, prior) = match event {
            Event::Rotation(rot) => (&rot.prefix, rot.sn, &rot.prior),
            Event::Interaction(ixn) => (&ixn.prefix, ixn.sn, &ixn.prior),
            other => return Err(Error::NotEstablished(other.ilk().to_string())),
        };

        if *prefix != self.prefix.to_string() {
            return Err(Error::InvalidPrefix(format!(
                "event for {prefix} applied to {}",
                self.prefix
            )));
        }
        if sn != self.sequence_number + 1 {
            return Err(Error::SequenceMismatch {
                expected: self.sequence_number + 1,
                got: sn,
            });
        }
        let expected_prior = self
            .prior_event_digest
            .as_ref()
            .ok_or_else(|| Error::NotEstablished(self.prefix.to_string()))?;
        if *prior != expected_prior.to_string() {
            return Err(Error::DigestMismatch(format!(
                "prior digest {prior}, expected {expected_prior}"
            )));
        }

        let digest = event.digest()?;
        match event {
            Event::Rotation(rot) => self.apply_rotation(
                KeyConfig {
                    keys: rot.keys.clone(),
                    next_digests: rot.next_digests.clone(),
                    current_threshold: rot.current_threshold.clone(),
                    next_threshold: rot.next_threshold.clone(),
                },
                &WitnessDelta::new(rot.cuts.clone(), rot.adds.clone()),
                Some(rot.toad),
                digest,
            ),
            _ => Ok(self.apply_interaction(digest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wits(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn config(keys: usize, next: usize) -> KeyConfig {
        KeyConfig {
            keys: (0..keys).map(|i| format!("K{i}")).collect(),
            next_digests: (0..next).map(|i| format!("D{i}")).collect(),
            current_threshold: Threshold::default_current(keys),
            next_threshold: Threshold::default_next(next),
        }
    }

    fn state() -> KeyState {
        KeyState::initial(
            Said::digest(b"icp"),
            config(1, 1),
            wits(&["W1", "W2", "W3"]),
            2,
        )
        .unwrap()
        .accepted(Said::digest(b"icp"))
    }

    #[test]
    fn test_initial_counters() {
        let s = KeyState::initial(Said::digest(b"x"), config(2, 2), vec![], 0).unwrap();
        assert_eq!(s.sequence_number, 0);
        assert_eq!(s.rotation_index, 0);
        assert!(s.prior_event_digest.is_none());
        assert!(s.is_transferable());
    }

    #[test]
    fn test_initial_rejects_empty_keys() {
        let result = KeyState::initial(Said::digest(b"x"), config(0, 1), vec![], 0);
        assert!(matches!(result, Err(Error::EmptyKeySet)));
    }

    #[test]
    fn test_rotation_advances_both_counters() {
        let s = state();
        let next = s
            .apply_rotation(config(2, 2), &WitnessDelta::default(), Some(2), Said::digest(b"rot"))
            .unwrap();

        assert_eq!(next.sequence_number, s.sequence_number + 1);
        assert_eq!(next.rotation_index, s.rotation_index + 1);
        assert_eq!(next.current_keys, vec!["K0", "K1"]);
        assert_eq!(next.prior_event_digest, Some(Said::digest(b"rot")));
        // Original untouched.
        assert_eq!(s.current_keys, vec!["K0"]);
    }

    #[test]
    fn test_interaction_advances_sequence_only() {
        let s = state();
        let twice = s
            .apply_interaction(Said::digest(b"ixn1"))
            .apply_interaction(Said::digest(b"ixn2"));

        assert_eq!(twice.sequence_number, s.sequence_number + 2);
        assert_eq!(twice.rotation_index, s.rotation_index);
        assert_eq!(twice.key_config(), s.key_config());
        assert_eq!(twice.witnesses, s.witnesses);
        assert_eq!(twice.toad, s.toad);
        assert_eq!(twice.prior_event_digest, Some(Said::digest(b"ixn2")));
    }

    #[test]
    fn test_cut_witness_toad_check() {
        let s = state();
        let delta = WitnessDelta::new(wits(&["W1"]), vec![]);

        let next = s
            .apply_rotation(config(1, 1), &delta, Some(2), Said::digest(b"rot"))
            .unwrap();
        assert_eq!(next.witnesses, wits(&["W2", "W3"]));

        let result = s.apply_rotation(config(1, 1), &delta, Some(3), Said::digest(b"rot"));
        assert!(matches!(
            result,
            Err(Error::ToadExceedsWitnessCount { toad: 3, witnesses: 2 })
        ));
    }

    #[test]
    fn test_cut_unknown_witness() {
        let delta = WitnessDelta::new(wits(&["W9"]), vec![]);
        assert!(matches!(
            delta.apply(&wits(&["W1"])),
            Err(Error::InvalidWitnessOp(_))
        ));
    }

    #[test]
    fn test_add_existing_witness() {
        let delta = WitnessDelta::new(vec![], wits(&["W1"]));
        assert!(matches!(
            delta.apply(&wits(&["W1"])),
            Err(Error::InvalidWitnessOp(_))
        ));

        let dup = WitnessDelta::new(vec![], wits(&["W4", "W4"]));
        assert!(matches!(
            dup.apply(&wits(&["W1"])),
            Err(Error::InvalidWitnessOp(_))
        ));
    }

    #[test]
    fn test_cut_and_readd_keeps_membership() {
        let current = wits(&["W1", "W2", "W3"]);
        let delta = WitnessDelta::new(wits(&["W1"]), wits(&["W1"]));
        let result = delta.apply(&current).unwrap();

        let before: HashSet<_> = current.iter().collect();
        let after: HashSet<_> = result.iter().collect();
        assert_eq!(before, after);
        assert_eq!(result, wits(&["W2", "W3", "W1"]));
    }

    #[test]
    fn test_ample() {
        assert_eq!(ample(0), 0);
        assert_eq!(ample(1), 1);
        assert_eq!(ample(2), 2);
        assert_eq!(ample(3), 3);
        assert_eq!(ample(4), 3);
        assert_eq!(ample(5), 4);
        assert_eq!(ample(7), 5);
    }

    #[test]
    fn test_resolve_toad() {
        assert_eq!(resolve_toad(None, 3).unwrap(), 3);
        assert_eq!(resolve_toad(Some(1), 3).unwrap(), 1);
        assert!(resolve_toad(Some(4), 3).is_err());
    }

    #[test]
    fn test_oversized_toad_rejected() {
        for toad in [u64::MAX, (1 << 32) + 1] {
            assert!(matches!(
                resolve_toad(Some(toad), 3),
                Err(Error::ToadExceedsWitnessCount { witnesses: 3, .. })
            ));
        }
    }
}

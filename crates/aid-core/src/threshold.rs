//! Signing thresholds.
//!
//! A threshold is either a simple cutoff ("at least k of the keys") written as
//! a hex integer, or a list of clauses of fractional weights, one weight per
//! key. A weighted threshold is met when every clause sums to at least one over
//! the keys that signed.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A fractional signing weight in (0, 1], kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Weight {
    num: u64,
    den: u64,
}

impl Weight {
    /// Create a weight from a numerator and denominator.
    pub fn new(num: u64, den: u64) -> Result<Self> {
        if den == 0 {
            return Err(Error::InvalidThreshold(format!("zero denominator in {num}/{den}")));
        }
        if num == 0 {
            return Err(Error::InvalidThreshold(format!("non-positive weight {num}/{den}")));
        }
        if num > den {
            return Err(Error::InvalidThreshold(format!("weight {num}/{den} exceeds 1")));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    pub fn numerator(&self) -> u64 {
        self.num
    }

    pub fn denominator(&self) -> u64 {
        self.den
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Weight {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let malformed = || Error::InvalidThreshold(format!("malformed weight '{s}'"));

        match s.split_once('/') {
            Some((num, den)) => {
                let num = num.trim().parse::<u64>().map_err(|_| malformed())?;
                let den = den.trim().parse::<u64>().map_err(|_| malformed())?;
                Self::new(num, den)
            }
            None => Self::new(s.parse::<u64>().map_err(|_| malformed())?, 1),
        }
    }
}

/// A signing threshold in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Threshold {
    /// At least this many signatures.
    Simple(u64),
    /// Clauses of per-key weights, in key order.
    Weighted(Vec<Vec<Weight>>),
}

impl Threshold {
    /// Parse a threshold from any of its accepted JSON forms.
    ///
    /// Accepts an integer, a hex string, a string holding a JSON list, a flat
    /// list of weights (one clause) or a list of lists (several clauses).
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Threshold::Simple)
                .ok_or_else(|| Error::InvalidThreshold(format!("invalid cutoff {n}"))),
            Value::String(s) => {
                let s = s.trim();
                if s.starts_with('[') {
                    let list: Value = serde_json::from_str(s)
                        .map_err(|e| Error::InvalidThreshold(e.to_string()))?;
                    return Self::parse_clauses(&list);
                }
                u64::from_str_radix(s, 16)
                    .map(Threshold::Simple)
                    .map_err(|_| Error::InvalidThreshold(format!("invalid hex cutoff '{s}'")))
            }
            Value::Array(_) => Self::parse_clauses(value),
            other => Err(Error::InvalidThreshold(format!("unsupported form {other}"))),
        }
    }

    fn parse_clauses(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::InvalidThreshold("expected a list of weights".into()))?;
        if items.is_empty() {
            return Err(Error::InvalidThreshold("empty weight list".into()));
        }

        let nested = items.iter().filter(|item| item.is_array()).count();
        let clauses: Vec<&Value> = if nested == items.len() {
            items.iter().collect()
        } else if nested == 0 {
            vec![value]
        } else {
            return Err(Error::InvalidThreshold("mixed weights and clauses".into()));
        };

        let mut parsed = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let weights = clause
                .as_array()
                .ok_or_else(|| Error::InvalidThreshold("clause must be a list".into()))?
                .iter()
                .map(parse_weight)
                .collect::<Result<Vec<_>>>()?;

            if weights.is_empty() {
                return Err(Error::InvalidThreshold("empty clause".into()));
            }
            if !clause_reaches_one(&weights)? {
                return Err(Error::InvalidThreshold(format!(
                    "clause {} sums to less than 1",
                    render_clause(&weights)
                )));
            }
            parsed.push(weights);
        }

        Ok(Threshold::Weighted(parsed))
    }

    /// Default current threshold for `key_count` keys: a majority, at least one.
    pub fn default_current(key_count: usize) -> Self {
        Threshold::Simple(key_count.div_ceil(2).max(1) as u64)
    }

    /// Default next threshold for `next_count` committed digests. Zero when
    /// nothing is committed.
    pub fn default_next(next_count: usize) -> Self {
        Threshold::Simple(next_count.div_ceil(2) as u64)
    }

    /// Number of key slots this threshold refers to.
    pub fn size(&self) -> usize {
        match self {
            Threshold::Simple(n) => usize::try_from(*n).unwrap_or(usize::MAX),
            Threshold::Weighted(clauses) => clauses.iter().map(Vec::len).sum(),
        }
    }

    /// Check this threshold against the number of keys it will govern.
    pub fn validate(&self, key_count: usize) -> Result<()> {
        match self {
            Threshold::Simple(0) if key_count == 0 => Ok(()),
            Threshold::Simple(0) => Err(Error::InvalidThreshold(format!(
                "zero cutoff over {key_count} keys"
            ))),
            Threshold::Simple(n) if *n > key_count as u64 => Err(Error::ThresholdKeyMismatch {
                required: *n,
                provided: key_count,
            }),
            Threshold::Simple(_) => Ok(()),
            Threshold::Weighted(_) if self.size() != key_count => {
                Err(Error::ThresholdKeyMismatch {
                    required: self.size() as u64,
                    provided: key_count,
                })
            }
            Threshold::Weighted(_) => Ok(()),
        }
    }

    /// Whether signatures from the keys at `indices` meet this threshold.
    pub fn is_satisfied_by(&self, indices: &BTreeSet<usize>) -> bool {
        match self {
            Threshold::Simple(n) => indices.len() as u64 >= *n,
            Threshold::Weighted(clauses) => {
                let mut offset = 0;
                clauses.iter().all(|clause| {
                    let signed: Vec<Weight> = clause
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| indices.contains(&(offset + i)))
                        .map(|(_, w)| *w)
                        .collect();
                    offset += clause.len();
                    // Overflow on pathological denominators counts as unmet.
                    clause_reaches_one(&signed).unwrap_or(false)
                })
            }
        }
    }

    /// Canonical JSON form, as written into the `kt`/`nt` event fields.
    pub fn sith(&self) -> Value {
        match self {
            Threshold::Simple(n) => Value::String(format!("{n:x}")),
            Threshold::Weighted(clauses) if clauses.len() == 1 => weights_value(&clauses[0]),
            Threshold::Weighted(clauses) => {
                Value::Array(clauses.iter().map(|c| weights_value(c)).collect())
            }
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sith() {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

impl FromStr for Threshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(&Value::String(s.to_string()))
    }
}

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.sith().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Threshold::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Resolve the thresholds of a rotation from what the caller supplied and the
/// prior state.
///
/// - current: the supplied value, else the prior current threshold when the key
///   count is unchanged, else the majority default over the new keys.
/// - next: the supplied value; else the supplied current threshold when it
///   fits the new digest count; else the majority default over the new digests.
pub fn resolve_rotation_thresholds(
    prior_current: &Threshold,
    prior_key_count: usize,
    key_count: usize,
    next_count: usize,
    current: Option<Threshold>,
    next: Option<Threshold>,
) -> (Threshold, Threshold) {
    let next = match (next, &current) {
        (Some(next), _) => next,
        (None, Some(current)) if current.validate(next_count).is_ok() => current.clone(),
        (None, _) => Threshold::default_next(next_count),
    };

    let current = match current {
        Some(current) => current,
        None if key_count == prior_key_count => prior_current.clone(),
        None => Threshold::default_current(key_count),
    };

    (current, next)
}

fn parse_weight(value: &Value) -> Result<Weight> {
    match value {
        Value::String(s) => s.parse(),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::InvalidThreshold(format!("invalid weight {n}")))
            .and_then(|n| Weight::new(n, 1)),
        other => Err(Error::InvalidThreshold(format!("invalid weight {other}"))),
    }
}

fn weights_value(weights: &[Weight]) -> Value {
    Value::Array(weights.iter().map(|w| Value::String(w.to_string())).collect())
}

fn render_clause(weights: &[Weight]) -> String {
    weights_value(weights).to_string()
}

/// Exact rational sum of a clause compared against one.
fn clause_reaches_one(weights: &[Weight]) -> Result<bool> {
    let overflow = || Error::InvalidThreshold("weight denominators too large".into());
    let (mut num, mut den) = (0u128, 1u128);

    for w in weights {
        let (wn, wd) = (w.num as u128, w.den as u128);
        num = num
            .checked_mul(wd)
            .and_then(|a| wn.checked_mul(den).and_then(|b| a.checked_add(b)))
            .ok_or_else(overflow)?;
        den = den.checked_mul(wd).ok_or_else(overflow)?;
        let g = gcd128(num, den);
        num /= g;
        den /= g;
    }

    Ok(num >= den)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn gcd128(a: u128, b: u128) -> u128 {
    if b == 0 { a.max(1) } else { gcd128(b, a % b) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn indices(list: &[usize]) -> BTreeSet<usize> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_parse_simple_hex() {
        assert_eq!("1".parse::<Threshold>().unwrap(), Threshold::Simple(1));
        assert_eq!("a".parse::<Threshold>().unwrap(), Threshold::Simple(10));
        assert_eq!(Threshold::parse(&json!(3)).unwrap(), Threshold::Simple(3));
        assert!("xyz".parse::<Threshold>().is_err());
    }

    #[test]
    fn test_parse_weighted_forms() {
        let flat = Threshold::parse(&json!(["1/2", "1/2", "1/2"])).unwrap();
        let quoted: Threshold = r#"["1/2","1/2","1/2"]"#.parse().unwrap();
        assert_eq!(flat, quoted);
        assert_eq!(flat.size(), 3);

        let nested = Threshold::parse(&json!([["1/2", "1/2"], ["1"]])).unwrap();
        assert_eq!(nested.size(), 3);
        assert_eq!(nested.sith(), json!([["1/2", "1/2"], ["1"]]));
    }

    #[test]
    fn test_canonical_weights_reduced() {
        let t = Threshold::parse(&json!(["2/4", "3/6"])).unwrap();
        assert_eq!(t.sith(), json!(["1/2", "1/2"]));
        assert_eq!(t.to_string(), r#"["1/2","1/2"]"#);
    }

    #[test]
    fn test_reject_bad_weights() {
        for bad in [
            json!(["0", "1"]),
            json!(["0/3", "1"]),
            json!(["-1/2", "1"]),
            json!(["1/0"]),
            json!(["3/2"]),
            json!(["1/3", "1/3"]),
            json!([["1/2", "1/2"], []]),
            json!([["1"], "1"]),
            json!([]),
        ] {
            let result = Threshold::parse(&bad);
            assert!(
                matches!(result, Err(Error::InvalidThreshold(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_against_keys() {
        assert!(Threshold::Simple(2).validate(2).is_ok());
        assert!(matches!(
            Threshold::Simple(3).validate(2),
            Err(Error::ThresholdKeyMismatch { required: 3, provided: 2 })
        ));
        assert!(Threshold::Simple(0).validate(0).is_ok());
        assert!(matches!(
            Threshold::Simple(0).validate(1),
            Err(Error::InvalidThreshold(_))
        ));

        let weighted = Threshold::parse(&json!(["1/2", "1/2"])).unwrap();
        assert!(weighted.validate(2).is_ok());
        assert!(matches!(
            weighted.validate(3),
            Err(Error::ThresholdKeyMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_cutoff_rejected() {
        // Would wrap to a small cutoff if narrowed to usize on 32-bit targets.
        for n in [u64::MAX, (1 << 32) + 1] {
            assert!(matches!(
                Threshold::Simple(n).validate(3),
                Err(Error::ThresholdKeyMismatch { required, provided: 3 }) if required == n
            ));
        }
    }

    #[test]
    fn test_default_majority() {
        for n in 1..=12usize {
            let t = Threshold::default_current(n);
            let quorum = n.div_ceil(2);
            assert_eq!(t, Threshold::Simple(quorum as u64));

            let enough: BTreeSet<usize> = (0..quorum).collect();
            assert!(t.is_satisfied_by(&enough), "n={n}");

            let too_few: BTreeSet<usize> = (0..quorum - 1).collect();
            assert!(!t.is_satisfied_by(&too_few), "n={n}");
        }
        assert_eq!(Threshold::default_next(0), Threshold::Simple(0));
        assert_eq!(Threshold::default_current(0), Threshold::Simple(1));
    }

    #[test]
    fn test_weighted_satisfaction() {
        let t = Threshold::parse(&json!([["1/2", "1/2", "1/2"], ["1/2", "1/2"]])).unwrap();

        assert!(t.is_satisfied_by(&indices(&[0, 1, 3, 4])));
        assert!(t.is_satisfied_by(&indices(&[1, 2, 3, 4])));
        // Second clause unmet.
        assert!(!t.is_satisfied_by(&indices(&[0, 1, 2, 3])));
        // First clause unmet.
        assert!(!t.is_satisfied_by(&indices(&[0, 3, 4])));
    }

    #[test]
    fn test_weighted_uneven() {
        let t = Threshold::parse(&json!(["1", "1/3", "1/3", "1/3"])).unwrap();
        assert!(t.is_satisfied_by(&indices(&[0])));
        assert!(t.is_satisfied_by(&indices(&[1, 2, 3])));
        assert!(!t.is_satisfied_by(&indices(&[1, 2])));
    }

    #[test]
    fn test_serde_roundtrip() {
        let t = Threshold::parse(&json!([["1/2", "1/2"], ["1"]])).unwrap();
        let text = serde_json::to_string(&t).unwrap();
        let back: Threshold = serde_json::from_str(&text).unwrap();
        assert_eq!(t, back);

        let simple: Threshold = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(serde_json::to_string(&simple).unwrap(), "\"2\"");
    }

    #[test]
    fn test_rotation_defaults_unchanged_count() {
        let prior = Threshold::Simple(2);
        let (current, next) = resolve_rotation_thresholds(&prior, 3, 3, 5, None, None);
        assert_eq!(current, Threshold::Simple(2));
        assert_eq!(next, Threshold::Simple(3));
    }

    #[test]
    fn test_rotation_defaults_changed_count() {
        let prior = Threshold::Simple(1);
        let (current, next) = resolve_rotation_thresholds(&prior, 1, 2, 2, None, None);
        assert_eq!(current, Threshold::Simple(1));
        assert_eq!(next, Threshold::Simple(1));

        let (current, _) = resolve_rotation_thresholds(&prior, 1, 4, 1, None, None);
        assert_eq!(current, Threshold::Simple(2));
    }

    #[test]
    fn test_rotation_next_follows_supplied_current() {
        let prior = Threshold::Simple(1);
        let (current, next) =
            resolve_rotation_thresholds(&prior, 2, 2, 2, Some(Threshold::Simple(2)), None);
        assert_eq!(current, Threshold::Simple(2));
        assert_eq!(next, Threshold::Simple(2));

        // Supplied current does not fit a single next digest.
        let (_, next) =
            resolve_rotation_thresholds(&prior, 2, 2, 1, Some(Threshold::Simple(2)), None);
        assert_eq!(next, Threshold::Simple(1));
    }
}

//! Event construction.
//!
//! Every builder is a pure function of its inputs: the prior [`KeyState`] is
//! read, never changed, and all validation happens before a body exists, so a
//! failed build leaves nothing to sign.

use crate::event::{
    DelegatedInceptionEvent, EndRole, Event, Ilk, InceptionEvent, InteractionEvent, ReplyEvent,
    Role, RotationEvent,
};
use crate::prefix::Prefix;
use crate::signing::saidify;
use crate::state::{KeyState, WitnessDelta, ensure_unique, resolve_toad};
use crate::threshold::{Threshold, resolve_rotation_thresholds};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Reply route authorizing an endpoint for a role.
pub const ROUTE_END_ROLE_ADD: &str = "/end/role/add";

/// Reply route withdrawing a role.
pub const ROUTE_END_ROLE_CUT: &str = "/end/role/cut";

/// Inputs to [`build_inception`].
#[derive(Debug, Clone, Default)]
pub struct InceptionArgs {
    pub keys: Vec<String>,
    pub next_digests: Vec<String>,
    /// Defaults to a majority of `keys`.
    pub current_threshold: Option<Threshold>,
    /// Defaults to a majority of `next_digests`.
    pub next_threshold: Option<Threshold>,
    pub witnesses: Vec<String>,
    /// Defaults to the ample threshold for `witnesses`.
    pub toad: Option<u64>,
    /// Configuration traits (`c`).
    pub traits: Vec<String>,
    pub seals: Vec<Value>,
    /// Emit a delegated inception committing to this delegator.
    pub delegator: Option<Prefix>,
}

/// Inputs to [`build_rotation`].
#[derive(Debug, Clone, Default)]
pub struct RotationArgs {
    pub keys: Vec<String>,
    pub next_digests: Vec<String>,
    pub current_threshold: Option<Threshold>,
    pub next_threshold: Option<Threshold>,
    pub cuts: Vec<String>,
    pub adds: Vec<String>,
    /// Defaults to the ample threshold for the resulting witnesses.
    pub toad: Option<u64>,
    pub seals: Vec<Value>,
}

/// Build an inception, or a delegated inception when a delegator is given.
pub fn build_inception(args: InceptionArgs) -> Result<Event> {
    if args.keys.is_empty() {
        return Err(Error::EmptyKeySet);
    }

    let current_threshold = args
        .current_threshold
        .unwrap_or_else(|| Threshold::default_current(args.keys.len()));
    let next_threshold = args
        .next_threshold
        .unwrap_or_else(|| Threshold::default_next(args.next_digests.len()));
    current_threshold.validate(args.keys.len())?;
    next_threshold.validate(args.next_digests.len())?;

    ensure_unique(&args.witnesses, "witnesses")?;
    let toad = resolve_toad(args.toad, args.witnesses.len())?;

    let inception = InceptionEvent {
        version: String::new(),
        ilk: Ilk::Icp,
        digest: String::new(),
        prefix: String::new(),
        sn: 0,
        current_threshold,
        keys: args.keys,
        next_threshold,
        next_digests: args.next_digests,
        toad,
        witnesses: args.witnesses,
        traits: args.traits,
        seals: args.seals,
    };

    match args.delegator {
        Some(delegator) => {
            let mut dip = DelegatedInceptionEvent {
                inception: InceptionEvent {
                    ilk: Ilk::Dip,
                    ..inception
                },
                delegator: delegator.to_string(),
            };
            saidify(&mut dip)?;
            Ok(Event::DelegatedInception(dip))
        }
        None => {
            let mut icp = inception;
            saidify(&mut icp)?;
            Ok(Event::Inception(icp))
        }
    }
}

/// Build the rotation that follows `prior`.
///
/// Omitted thresholds are resolved with [`resolve_rotation_thresholds`] and an
/// omitted toad is recomputed for the resulting witness list.
pub fn build_rotation(prior: &KeyState, args: RotationArgs) -> Result<Event> {
    if args.keys.is_empty() {
        return Err(Error::EmptyKeySet);
    }
    if !prior.is_transferable() {
        return Err(Error::NonTransferable(prior.prefix.to_string()));
    }
    let prior_digest = prior
        .prior_event_digest
        .as_ref()
        .ok_or_else(|| Error::NotEstablished(prior.prefix.to_string()))?;

    let (current_threshold, next_threshold) = resolve_rotation_thresholds(
        &prior.current_threshold,
        prior.current_keys.len(),
        args.keys.len(),
        args.next_digests.len(),
        args.current_threshold,
        args.next_threshold,
    );
    current_threshold.validate(args.keys.len())?;
    next_threshold.validate(args.next_digests.len())?;

    let witnesses = WitnessDelta::new(args.cuts.clone(), args.adds.clone()).apply(&prior.witnesses)?;
    let toad = resolve_toad(args.toad, witnesses.len())?;

    let mut rot = RotationEvent {
        version: String::new(),
        ilk: Ilk::Rot,
        digest: String::new(),
        prefix: prior.prefix.to_string(),
        sn: prior.sequence_number + 1,
        prior: prior_digest.to_string(),
        current_threshold,
        keys: args.keys,
        next_threshold,
        next_digests: args.next_digests,
        toad,
        cuts: args.cuts,
        adds: args.adds,
        seals: args.seals,
    };
    saidify(&mut rot)?;
    Ok(Event::Rotation(rot))
}

/// Build the interaction that follows `prior`, anchoring `seals` in order.
pub fn build_interaction(prior: &KeyState, seals: Vec<Value>) -> Result<Event> {
    let prior_digest = prior
        .prior_event_digest
        .as_ref()
        .ok_or_else(|| Error::NotEstablished(prior.prefix.to_string()))?;

    let mut ixn = InteractionEvent {
        version: String::new(),
        ilk: Ilk::Ixn,
        digest: String::new(),
        prefix: prior.prefix.to_string(),
        sn: prior.sequence_number + 1,
        prior: prior_digest.to_string(),
        seals,
    };
    saidify(&mut ixn)?;
    Ok(Event::Interaction(ixn))
}

/// Build a reply authorizing `eid` to act in `role` for `prefix`, or
/// withdrawing the role when `eid` is `None`.
pub fn build_authorization_reply(
    prefix: &Prefix,
    role: Role,
    eid: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Event> {
    let route = match eid {
        Some(_) => ROUTE_END_ROLE_ADD,
        None => ROUTE_END_ROLE_CUT,
    };

    let mut rpy = ReplyEvent {
        version: String::new(),
        ilk: Ilk::Rpy,
        digest: String::new(),
        issued_at: at.to_rfc3339_opts(SecondsFormat::Micros, false),
        route: route.to_string(),
        data: EndRole {
            cid: prefix.to_string(),
            role,
            eid: eid.map(str::to_string),
        },
    };
    saidify(&mut rpy)?;
    Ok(Event::Reply(rpy))
}

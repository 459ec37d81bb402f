//! Identifier lifecycle: derive keys, build the event, sign, submit.
//!
//! Every operation validates and builds before it signs, and signs before it
//! submits, so a failure at any step leaves no signature behind and no
//! counter advanced.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use aid_agent::{AgentError, CreateRequest, Identifier, UpdateRequest};
use aid_core::event::{EndRole, Event, Role};
use aid_core::{
    Error as CoreError, GroupKeyMaterial, InceptionArgs, IndexedSignature, KeyState, Prefix,
    RotationArgs, SignedEvent, Threshold, build_authorization_reply, build_inception,
    build_interaction, build_rotation,
};
use aid_keeper::{
    Algorithm, GroupMember, GroupParams, KeyManager, KeyParams, RandyParams, SaltyParams,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Key source for a new identifier.
#[derive(Debug, Clone, Default)]
pub enum KeySource {
    /// The configured default strategy.
    #[default]
    Default,
    Salty,
    Randy,
    /// A group in which the identifier filed under `member` holds a slot.
    Group {
        member: String,
        members: Vec<KeyState>,
        rotation_members: Vec<KeyState>,
    },
}

/// Options for [`Identifiers::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Commit to next keys. A non-transferable identifier can never rotate.
    pub transferable: bool,
    /// Current keys; defaults to the configured count.
    pub count: Option<usize>,
    /// Next keys; defaults to the configured count.
    pub next_count: Option<usize>,
    pub current_threshold: Option<Threshold>,
    pub next_threshold: Option<Threshold>,
    pub witnesses: Vec<String>,
    pub toad: Option<u64>,
    pub delegator: Option<Prefix>,
    /// Seals anchored in the inception.
    pub seals: Vec<Value>,
    pub keys: KeySource,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            transferable: true,
            count: None,
            next_count: None,
            current_threshold: None,
            next_threshold: None,
            witnesses: Vec::new(),
            toad: None,
            delegator: None,
            seals: Vec::new(),
            keys: KeySource::Default,
        }
    }
}

/// New member states for rotating a group identifier.
#[derive(Debug, Clone)]
pub struct GroupRotation {
    pub members: Vec<KeyState>,
    pub rotation_members: Vec<KeyState>,
    /// The local member's rotation index after its own rotation.
    pub member_rotation_index: u64,
    /// The local member's parameters after its own rotation.
    pub member_params: KeyParams,
}

/// Options for [`Identifiers::rotate`].
#[derive(Debug, Clone, Default)]
pub struct RotateOptions {
    /// Next keys to commit to; defaults to the configured count.
    pub next_count: Option<usize>,
    pub current_threshold: Option<Threshold>,
    pub next_threshold: Option<Threshold>,
    pub cuts: Vec<String>,
    pub adds: Vec<String>,
    pub toad: Option<u64>,
    pub seals: Vec<Value>,
    /// Required for group identifiers.
    pub group: Option<GroupRotation>,
}

/// Lifecycle actions accepted by [`Identifiers::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Rotate,
    Interact,
    Authorize,
}

impl std::str::FromStr for UpdateKind {
    type Err = CoreError;

    fn from_str(s: &str) -> aid_core::Result<Self> {
        match s {
            "rotate" => Ok(UpdateKind::Rotate),
            "interact" => Ok(UpdateKind::Interact),
            "authorize" => Ok(UpdateKind::Authorize),
            other => Err(CoreError::UnsupportedUpdateType(other.to_string())),
        }
    }
}

/// Inputs for [`Identifiers::update`]; each action reads the fields it needs.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub rotate: RotateOptions,
    pub seals: Vec<Value>,
    pub role: Role,
    pub eid: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            rotate: RotateOptions::default(),
            seals: Vec::new(),
            role: Role::Agent,
            eid: None,
        }
    }
}

/// A signed event and what the agent returned for it.
#[derive(Debug, Clone)]
pub struct Submission<T> {
    pub event: SignedEvent,
    pub accepted: T,
}

/// Creates and evolves identifiers through a key manager and a transport.
pub struct Identifiers<T, K> {
    transport: T,
    manager: K,
    config: ClientConfig,
    /// Salt-derivation index for the next salty identifier.
    pidx: Mutex<u64>,
    /// One writer per alias.
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<T: Transport, K: KeyManager> Identifiers<T, K> {
    pub fn new(transport: T, manager: K, config: ClientConfig) -> Self {
        Self {
            transport,
            manager,
            config,
            pidx: Mutex::new(0),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Resume salt derivation from a persisted index.
    pub fn with_pidx(mut self, pidx: u64) -> Self {
        self.pidx = Mutex::new(pidx);
        self
    }

    pub async fn pidx(&self) -> u64 {
        *self.pidx.lock().await
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn manager(&self) -> &K {
        &self.manager
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Drop the lock entry for `name` unless another operation holds it.
    fn release(&self, name: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap();
        let idle = locks
            .get(name)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) <= 2);
        if idle {
            locks.remove(name);
        }
    }

    /// Current identifier for `name`; forgets the lock entry of unknown names.
    async fn fetch(&self, name: &str, lock: &Arc<Mutex<()>>) -> Result<Identifier> {
        let result = self.transport.get(name).await;
        if let Err(ClientError::Agent(AgentError::NotFound(_))) = &result {
            self.release(name, lock);
        }
        result
    }

    pub async fn list(&self) -> Result<Vec<Identifier>> {
        self.transport.list().await
    }

    pub async fn get(&self, name: &str) -> Result<Identifier> {
        self.transport.get(name).await
    }

    /// Incept a new identifier under `name`.
    pub async fn create(
        &self,
        name: &str,
        options: CreateOptions,
    ) -> Result<Submission<Identifier>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let result = self.incept(name, options).await;
        if result.is_err() {
            self.release(name, &lock);
        }
        result
    }

    async fn incept(&self, name: &str, options: CreateOptions) -> Result<Submission<Identifier>> {
        // Held until submission so concurrent creates cannot share an index.
        let mut pidx = self.pidx.lock().await;

        let count = options.count.unwrap_or(self.config.count);
        let next_count = if options.transferable {
            options.next_count.unwrap_or(self.config.next_count)
        } else {
            0
        };

        let params = match options.keys {
            KeySource::Group {
                member,
                members,
                rotation_members,
            } => self.group_params(&member, &members, &rotation_members).await?,
            KeySource::Salty => self.salty_params(*pidx, count, next_count),
            KeySource::Randy => randy_params(count, next_count),
            KeySource::Default => match self.config.algorithm {
                Algorithm::Randy => randy_params(count, next_count),
                _ => self.salty_params(*pidx, count, next_count),
            },
        };

        let keys = self.manager.keys(&params, 0)?;
        let next_digests = if options.transferable {
            self.manager.next_digests(&params, 0)?
        } else {
            Vec::new()
        };

        let event = build_inception(InceptionArgs {
            keys,
            next_digests,
            current_threshold: options.current_threshold,
            next_threshold: options.next_threshold,
            witnesses: options.witnesses,
            toad: options.toad,
            traits: Vec::new(),
            seals: options.seals,
            delegator: options.delegator,
        })?;
        let signatures = self.manager.sign(&event.canonicalize()?, &params, 0)?;

        let request = CreateRequest {
            name: name.to_string(),
            event: event.clone(),
            signatures: signatures.clone(),
            params: params.clone(),
        };
        let identifier = self.transport.create(request).await.inspect_err(|e| {
            warn!(name, error = %e, "inception rejected");
        })?;

        if params.algorithm() == Algorithm::Salty {
            *pidx += 1;
        }
        info!(name, prefix = %identifier.prefix, algo = %params.algorithm(), "identifier created");

        Ok(Submission {
            event: SignedEvent { event, signatures },
            accepted: identifier,
        })
    }

    /// Rotate the keys of `name` to the ones committed at its last
    /// establishment event.
    pub async fn rotate(
        &self,
        name: &str,
        options: RotateOptions,
    ) -> Result<Submission<Identifier>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let identifier = self.fetch(name, &lock).await?;
        let state = &identifier.state;
        if !state.is_transferable() {
            return Err(CoreError::NonTransferable(name.to_string()).into());
        }
        let ridx = state.rotation_index + 1;

        let params = match (&identifier.params, options.group) {
            (KeyParams::Group(current), Some(group)) => KeyParams::Group(GroupParams {
                member: GroupMember {
                    prefix: current.member.prefix.clone(),
                    params: Box::new(group.member_params),
                    rotation_index: group.member_rotation_index,
                },
                material: GroupKeyMaterial::resolve(&group.members, &group.rotation_members)?,
            }),
            (KeyParams::Group(_), None) => {
                return Err(CoreError::GroupMemberMismatch(
                    "group rotation needs the members' new states".into(),
                )
                .into());
            }
            (params, _) => {
                params.rotated(options.next_count.unwrap_or(self.config.next_count))
            }
        };

        let keys = self.manager.keys(&params, ridx)?;
        let next_digests = self.manager.next_digests(&params, ridx)?;
        let event = build_rotation(
            state,
            RotationArgs {
                keys,
                next_digests,
                current_threshold: options.current_threshold,
                next_threshold: options.next_threshold,
                cuts: options.cuts,
                adds: options.adds,
                toad: options.toad,
                seals: options.seals,
            },
        )?;
        if let Event::Rotation(rot) = &event {
            debug!(
                name,
                kt = %rot.current_threshold,
                nt = %rot.next_threshold,
                bt = rot.toad,
                "rotation thresholds"
            );
        }

        let signatures = self.manager.sign(&event.canonicalize()?, &params, ridx)?;
        let request = UpdateRequest {
            event: event.clone(),
            signatures: signatures.clone(),
            params: Some(params),
        };
        let updated = self.transport.update(name, request).await.inspect_err(|e| {
            warn!(name, error = %e, "rotation rejected");
        })?;

        info!(name, sn = updated.state.sequence_number, ridx, "identifier rotated");
        Ok(Submission {
            event: SignedEvent { event, signatures },
            accepted: updated,
        })
    }

    /// Anchor `seals` in an interaction event for `name`.
    pub async fn interact(&self, name: &str, seals: Vec<Value>) -> Result<Submission<Identifier>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let identifier = self.fetch(name, &lock).await?;
        let event = build_interaction(&identifier.state, seals)?;
        let signatures = self.sign_current(&identifier, &event)?;

        let request = UpdateRequest {
            event: event.clone(),
            signatures: signatures.clone(),
            params: None,
        };
        let updated = self.transport.update(name, request).await.inspect_err(|e| {
            warn!(name, error = %e, "interaction rejected");
        })?;

        info!(name, sn = updated.state.sequence_number, "interaction anchored");
        Ok(Submission {
            event: SignedEvent { event, signatures },
            accepted: updated,
        })
    }

    /// Authorize `eid` to act in `role` for `name`, or withdraw the role when
    /// `eid` is `None`.
    pub async fn authorize(
        &self,
        name: &str,
        role: Role,
        eid: Option<&str>,
    ) -> Result<Submission<Vec<EndRole>>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let identifier = self.fetch(name, &lock).await?;
        let event = build_authorization_reply(&identifier.prefix, role, eid, Utc::now())?;
        let signatures = self.sign_current(&identifier, &event)?;

        let reply = SignedEvent { event, signatures };
        let roles = self
            .transport
            .add_end_role(name, reply.clone())
            .await
            .inspect_err(|e| warn!(name, error = %e, "end role rejected"))?;

        info!(name, ?role, eid, "end role submitted");
        Ok(Submission {
            event: reply,
            accepted: roles,
        })
    }

    /// Run the lifecycle action named `kind`: `rotate`, `interact` or
    /// `authorize`.
    pub async fn update(
        &self,
        name: &str,
        kind: &str,
        options: UpdateOptions,
    ) -> Result<SignedEvent> {
        let kind: UpdateKind = kind.parse()?;
        let event = match kind {
            UpdateKind::Rotate => self.rotate(name, options.rotate).await?.event,
            UpdateKind::Interact => self.interact(name, options.seals).await?.event,
            UpdateKind::Authorize => {
                self.authorize(name, options.role, options.eid.as_deref())
                    .await?
                    .event
            }
        };
        Ok(event)
    }

    /// Forget `name` locally. No event is emitted.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        self.transport.delete(name).await?;
        self.locks.lock().unwrap().remove(name);
        info!(name, "identifier deleted");
        Ok(())
    }

    fn sign_current(
        &self,
        identifier: &Identifier,
        event: &Event,
    ) -> Result<Vec<IndexedSignature>> {
        Ok(self.manager.sign(
            &event.canonicalize()?,
            &identifier.params,
            identifier.state.rotation_index,
        )?)
    }

    fn salty_params(&self, pidx: u64, count: usize, next_count: usize) -> KeyParams {
        KeyParams::Salty(SaltyParams {
            stem: self.config.stem.clone(),
            pidx,
            count,
            next_count,
        })
    }

    async fn group_params(
        &self,
        member: &str,
        members: &[KeyState],
        rotation_members: &[KeyState],
    ) -> Result<KeyParams> {
        let local = self.transport.get(member).await?;
        let material = GroupKeyMaterial::resolve(members, rotation_members)?;
        if material.member_index(&local.prefix).is_none() {
            return Err(CoreError::GroupMemberMismatch(format!(
                "{member} is not a signing member"
            ))
            .into());
        }

        Ok(KeyParams::Group(GroupParams {
            member: GroupMember {
                prefix: local.prefix,
                params: Box::new(local.params),
                rotation_index: local.state.rotation_index,
            },
            material,
        }))
    }
}

fn randy_params(count: usize, next_count: usize) -> KeyParams {
    KeyParams::Randy(RandyParams {
        keyset: Uuid::now_v7(),
        count,
        next_count,
    })
}

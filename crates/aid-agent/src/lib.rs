//! Agent for the AID key event lifecycle.
//!
//! Accepts signed events for identifiers filed under local alias names:
//! inceptions create an identifier, rotations and interactions extend it, and
//! end-role replies record which endpoints act for it. Every event is checked
//! for chaining, digest and signatures before the stored state moves.

use aid_core::event::{EndRole, Event, Ilk};
use aid_core::builder::{ROUTE_END_ROLE_ADD, ROUTE_END_ROLE_CUT};
use aid_core::verify::{verify_next_threshold, verify_prior_commitment, verify_signatures};
use aid_core::{Error as CoreError, IndexedSignature, KeyState, Prefix, SignedEvent};
use aid_keeper::KeyParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Identifier not found: {0}")]
    NotFound(String),

    #[error("Identifier already exists: {0}")]
    AlreadyExists(String),

    #[error("Expected {expected} event, got {got}")]
    UnexpectedEvent { expected: &'static str, got: Ilk },

    #[error("Unknown reply route: {0}")]
    UnknownRoute(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// An identifier held by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    /// Local alias.
    pub name: String,
    pub prefix: Prefix,
    /// Key parameters the controller derives its keys with.
    pub params: KeyParams,
    /// State after the last accepted event.
    pub state: KeyState,
    /// Accepted key events, in order.
    pub events: Vec<SignedEvent>,
    /// Endpoints currently authorized for a role.
    pub end_roles: Vec<EndRole>,
    pub created_at: DateTime<Utc>,
}

/// Inception submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub name: String,
    pub event: Event,
    pub signatures: Vec<IndexedSignature>,
    pub params: KeyParams,
}

/// Rotation or interaction submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub event: Event,
    pub signatures: Vec<IndexedSignature>,
    /// Replacement key parameters, sent with rotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<KeyParams>,
}

/// In-memory identifier store.
pub struct Agent {
    identifiers: RwLock<HashMap<String, Identifier>>,
}

impl Agent {
    pub fn new() -> Self {
        Self {
            identifiers: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild an agent from [`Agent::snapshot`] output.
    pub fn restore(identifiers: Vec<Identifier>) -> Self {
        Self {
            identifiers: RwLock::new(
                identifiers
                    .into_iter()
                    .map(|id| (id.name.clone(), id))
                    .collect(),
            ),
        }
    }

    /// All identifiers, ordered by name.
    pub fn snapshot(&self) -> Vec<Identifier> {
        let ids = self.identifiers.read().unwrap();
        let mut all: Vec<Identifier> = ids.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Accept an inception or delegated inception under `request.name`.
    pub fn create(&self, request: CreateRequest) -> Result<Identifier> {
        let ilk = request.event.ilk();
        if !matches!(ilk, Ilk::Icp | Ilk::Dip) {
            return Err(AgentError::UnexpectedEvent {
                expected: "inception",
                got: ilk,
            });
        }

        request.event.verify_digest()?;
        let state = KeyState::from_inception(&request.event)?;
        verify_signatures(
            &request.event.canonicalize()?,
            &state.current_keys,
            &state.current_threshold,
            &request.signatures,
        )?;

        let mut ids = self.identifiers.write().unwrap();
        if ids.contains_key(&request.name) {
            return Err(AgentError::AlreadyExists(request.name));
        }

        let identifier = Identifier {
            name: request.name.clone(),
            prefix: state.prefix.clone(),
            params: request.params,
            state,
            events: vec![SignedEvent {
                event: request.event,
                signatures: request.signatures,
            }],
            end_roles: Vec::new(),
            created_at: Utc::now(),
        };
        ids.insert(request.name, identifier.clone());

        info!(name = %identifier.name, prefix = %identifier.prefix, "identifier created");
        Ok(identifier)
    }

    /// Accept a rotation or interaction for `name`.
    pub fn update(&self, name: &str, request: UpdateRequest) -> Result<Identifier> {
        let mut ids = self.identifiers.write().unwrap();
        let identifier = ids
            .get_mut(name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;

        request.event.verify_digest()?;
        let message = request.event.canonicalize()?;
        let current = &identifier.state;

        let next = match &request.event {
            Event::Rotation(rot) => {
                let next = current.apply(&request.event)?;
                verify_prior_commitment(&current.next_key_digests, &rot.keys)?;
                let signers = verify_signatures(
                    &message,
                    &rot.keys,
                    &rot.current_threshold,
                    &request.signatures,
                )?;
                verify_next_threshold(
                    &current.next_key_digests,
                    &current.next_threshold,
                    &rot.keys,
                    &signers,
                )?;
                next
            }
            Event::Interaction(_) => {
                let next = current.apply(&request.event)?;
                verify_signatures(
                    &message,
                    &current.current_keys,
                    &current.current_threshold,
                    &request.signatures,
                )?;
                next
            }
            other => {
                return Err(AgentError::UnexpectedEvent {
                    expected: "rotation or interaction",
                    got: other.ilk(),
                });
            }
        };

        info!(
            name,
            ilk = %request.event.ilk(),
            sn = next.sequence_number,
            "event accepted"
        );

        identifier.state = next;
        if let Some(params) = request.params {
            identifier.params = params;
        }
        identifier.events.push(SignedEvent {
            event: request.event,
            signatures: request.signatures,
        });
        Ok(identifier.clone())
    }

    /// Accept an end-role reply for `name` and return the resulting roles.
    pub fn add_end_role(&self, name: &str, reply: SignedEvent) -> Result<Vec<EndRole>> {
        let mut ids = self.identifiers.write().unwrap();
        let identifier = ids
            .get_mut(name)
            .ok_or_else(|| AgentError::NotFound(name.to_string()))?;

        let Event::Reply(rpy) = &reply.event else {
            return Err(AgentError::UnexpectedEvent {
                expected: "reply",
                got: reply.event.ilk(),
            });
        };

        if rpy.data.cid != identifier.prefix.to_string() {
            return Err(CoreError::InvalidPrefix(format!(
                "reply for {} sent to {}",
                rpy.data.cid, identifier.prefix
            ))
            .into());
        }
        reply.event.verify_digest()?;
        verify_signatures(
            &reply.event.canonicalize()?,
            &identifier.state.current_keys,
            &identifier.state.current_threshold,
            &reply.signatures,
        )?;

        match rpy.route.as_str() {
            ROUTE_END_ROLE_ADD => {
                if !identifier.end_roles.contains(&rpy.data) {
                    identifier.end_roles.push(rpy.data.clone());
                }
            }
            ROUTE_END_ROLE_CUT => identifier.end_roles.retain(|r| r.role != rpy.data.role),
            other => return Err(AgentError::UnknownRoute(other.to_string())),
        }

        info!(name, route = %rpy.route, role = ?rpy.data.role, "end role updated");
        Ok(identifier.end_roles.clone())
    }

    pub fn get(&self, name: &str) -> Result<Identifier> {
        let ids = self.identifiers.read().unwrap();
        ids.get(name)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    /// All identifiers, ordered by name.
    pub fn list(&self) -> Vec<Identifier> {
        self.snapshot()
    }

    /// Forget an identifier. No event is emitted.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut ids = self.identifiers.write().unwrap();
        ids.remove(name)
            .map(|_| ())
            .ok_or_else(|| AgentError::NotFound(name.to_string()))
    }

    pub fn count(&self) -> usize {
        self.identifiers.read().unwrap().len()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aid_core::event::Role;
    use aid_core::{
        InceptionArgs, RotationArgs, Threshold, build_authorization_reply, build_inception,
        build_interaction, build_rotation,
    };
    use aid_keeper::{KeyManager, Manager, SaltyParams, SaltyStrategy};

    struct Controller {
        manager: Manager,
        params: KeyParams,
    }

    impl Controller {
        fn new(pidx: u64, count: usize) -> Self {
            Self {
                manager: Manager::new().with(SaltyStrategy::new(b"agent-test".to_vec())),
                params: KeyParams::Salty(SaltyParams {
                    stem: "agent".into(),
                    pidx,
                    count,
                    next_count: count,
                }),
            }
        }

        fn sign(&self, event: &Event, ridx: u64) -> Vec<IndexedSignature> {
            self.manager
                .sign(&event.canonicalize().unwrap(), &self.params, ridx)
                .unwrap()
        }

        fn create_request(&self, name: &str, current_threshold: Option<Threshold>) -> CreateRequest {
            let event = build_inception(InceptionArgs {
                keys: self.manager.keys(&self.params, 0).unwrap(),
                next_digests: self.manager.next_digests(&self.params, 0).unwrap(),
                current_threshold,
                ..Default::default()
            })
            .unwrap();
            CreateRequest {
                name: name.to_string(),
                signatures: self.sign(&event, 0),
                event,
                params: self.params.clone(),
            }
        }
    }

    #[test]
    fn test_create_and_get() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);

        let created = agent.create(controller.create_request("alice", None)).unwrap();
        assert_eq!(created.state.sequence_number, 0);

        let fetched = agent.get("alice").unwrap();
        assert_eq!(fetched.prefix, created.prefix);
        assert_eq!(agent.count(), 1);
    }

    #[test]
    fn test_reject_duplicate_name() {
        let agent = Agent::new();
        agent.create(Controller::new(0, 1).create_request("alice", None)).unwrap();

        let result = agent.create(Controller::new(1, 1).create_request("alice", None));
        assert!(matches!(result, Err(AgentError::AlreadyExists(_))));
    }

    #[test]
    fn test_reject_foreign_signature() {
        let agent = Agent::new();
        let mut request = Controller::new(0, 1).create_request("alice", None);
        request.signatures = Controller::new(9, 1).sign(&request.event, 0);

        let result = agent.create(request);
        assert!(matches!(
            result,
            Err(AgentError::Core(CoreError::InvalidSignature))
        ));
    }

    #[test]
    fn test_reject_insufficient_signatures() {
        let agent = Agent::new();
        let mut request =
            Controller::new(0, 2).create_request("alice", Some(Threshold::Simple(2)));
        request.signatures.truncate(1);

        let result = agent.create(request);
        assert!(matches!(
            result,
            Err(AgentError::Core(CoreError::InsufficientSignatures(_)))
        ));
    }

    #[test]
    fn test_rotation_reveals_commitment() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);
        let created = agent.create(controller.create_request("alice", None)).unwrap();

        let rotated = controller.params.rotated(1);
        let event = build_rotation(
            &created.state,
            RotationArgs {
                keys: controller.manager.keys(&rotated, 1).unwrap(),
                next_digests: controller.manager.next_digests(&rotated, 1).unwrap(),
                ..Default::default()
            },
        )
        .unwrap();
        let signatures = controller.manager
            .sign(&event.canonicalize().unwrap(), &rotated, 1)
            .unwrap();

        let updated = agent
            .update(
                "alice",
                UpdateRequest {
                    event,
                    signatures,
                    params: Some(rotated),
                },
            )
            .unwrap();
        assert_eq!(updated.state.sequence_number, 1);
        assert_eq!(updated.state.rotation_index, 1);
        assert_eq!(updated.events.len(), 2);
    }

    #[test]
    fn test_rotation_needs_prior_next_threshold() {
        let agent = Agent::new();
        let controller = Controller::new(0, 2);
        let inception = build_inception(InceptionArgs {
            keys: controller.manager.keys(&controller.params, 0).unwrap(),
            next_digests: controller.manager.next_digests(&controller.params, 0).unwrap(),
            next_threshold: Some(Threshold::Simple(2)),
            ..Default::default()
        })
        .unwrap();
        let created = agent
            .create(CreateRequest {
                name: "alice".into(),
                signatures: controller.sign(&inception, 0),
                event: inception,
                params: controller.params.clone(),
            })
            .unwrap();

        // One next-key holder lowers kt to 1 and signs alone.
        let rotated = controller.params.rotated(2);
        let event = build_rotation(
            &created.state,
            RotationArgs {
                keys: controller.manager.keys(&rotated, 1).unwrap(),
                next_digests: controller.manager.next_digests(&rotated, 1).unwrap(),
                current_threshold: Some(Threshold::Simple(1)),
                ..Default::default()
            },
        )
        .unwrap();
        let mut signatures = controller.manager
            .sign(&event.canonicalize().unwrap(), &rotated, 1)
            .unwrap();
        let both = signatures.clone();
        signatures.truncate(1);

        let result = agent.update(
            "alice",
            UpdateRequest {
                event: event.clone(),
                signatures,
                params: Some(rotated.clone()),
            },
        );
        assert!(matches!(
            result,
            Err(AgentError::Core(CoreError::InsufficientSignatures(_)))
        ));
        assert_eq!(agent.get("alice").unwrap().state.sequence_number, 0);

        let updated = agent
            .update(
                "alice",
                UpdateRequest {
                    event,
                    signatures: both,
                    params: Some(rotated),
                },
            )
            .unwrap();
        assert_eq!(updated.state.sequence_number, 1);
    }

    #[test]
    fn test_rotation_with_uncommitted_keys() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);
        let created = agent.create(controller.create_request("alice", None)).unwrap();

        // Keys from rotation 2 were never committed to.
        let event = build_rotation(
            &created.state,
            RotationArgs {
                keys: controller.manager.keys(&controller.params, 2).unwrap(),
                next_digests: controller.manager.next_digests(&controller.params, 2).unwrap(),
                ..Default::default()
            },
        )
        .unwrap();
        let signatures = controller.sign(&event, 2);

        let result = agent.update(
            "alice",
            UpdateRequest {
                event,
                signatures,
                params: None,
            },
        );
        assert!(matches!(
            result,
            Err(AgentError::Core(CoreError::DigestMismatch(_)))
        ));
        assert_eq!(agent.get("alice").unwrap().state.sequence_number, 0);
    }

    #[test]
    fn test_stale_interaction_rejected() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);
        let created = agent.create(controller.create_request("alice", None)).unwrap();

        let first = build_interaction(&created.state, vec![]).unwrap();
        let request = UpdateRequest {
            signatures: controller.sign(&first, 0),
            event: first,
            params: None,
        };
        agent.update("alice", request.clone()).unwrap();

        let result = agent.update("alice", request);
        assert!(matches!(
            result,
            Err(AgentError::Core(CoreError::SequenceMismatch { expected: 2, got: 1 }))
        ));
    }

    #[test]
    fn test_update_unknown_name() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);
        let request = controller.create_request("alice", None);

        let result = agent.update(
            "bob",
            UpdateRequest {
                event: request.event,
                signatures: request.signatures,
                params: None,
            },
        );
        assert!(matches!(result, Err(AgentError::NotFound(_))));
    }

    #[test]
    fn test_end_roles_add_and_cut() {
        let agent = Agent::new();
        let controller = Controller::new(0, 1);
        let created = agent.create(controller.create_request("alice", None)).unwrap();

        let add = build_authorization_reply(&created.prefix, Role::Agent, Some("eid-1"), Utc::now())
            .unwrap();
        let roles = agent
            .add_end_role(
                "alice",
                SignedEvent {
                    signatures: controller.sign(&add, 0),
                    event: add,
                },
            )
            .unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].eid.as_deref(), Some("eid-1"));

        let cut = build_authorization_reply(&created.prefix, Role::Agent, None, Utc::now()).unwrap();
        let roles = agent
            .add_end_role(
                "alice",
                SignedEvent {
                    signatures: controller.sign(&cut, 0),
                    event: cut,
                },
            )
            .unwrap();
        assert!(roles.is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let agent = Agent::new();
        agent.create(Controller::new(0, 1).create_request("b", None)).unwrap();
        agent.create(Controller::new(1, 1).create_request("a", None)).unwrap();

        let snapshot = agent.snapshot();
        assert_eq!(snapshot[0].name, "a");

        let text = serde_json::to_string(&snapshot).unwrap();
        let restored = Agent::restore(serde_json::from_str(&text).unwrap());
        assert_eq!(restored.get("b").unwrap(), agent.get("b").unwrap());
        agent.delete("b").unwrap();
        assert!(agent.get("b").is_err());
    }
}

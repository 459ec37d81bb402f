//! Submission of signed events to an agent.

use crate::error::Result;
use aid_agent::{Agent, CreateRequest, Identifier, UpdateRequest};
use aid_core::SignedEvent;
use aid_core::event::EndRole;
use std::future::Future;
use std::sync::Arc;

/// Carries requests to an agent and returns what it accepted.
pub trait Transport: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<Vec<Identifier>>> + Send;

    fn get(&self, name: &str) -> impl Future<Output = Result<Identifier>> + Send;

    /// Insert a new identifier.
    fn create(&self, request: CreateRequest) -> impl Future<Output = Result<Identifier>> + Send;

    /// Extend an identifier with a rotation or interaction.
    fn update(
        &self,
        name: &str,
        request: UpdateRequest,
    ) -> impl Future<Output = Result<Identifier>> + Send;

    fn add_end_role(
        &self,
        name: &str,
        reply: SignedEvent,
    ) -> impl Future<Output = Result<Vec<EndRole>>> + Send;

    fn delete(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Drives an agent in the same process.
#[derive(Clone, Default)]
pub struct LocalTransport {
    agent: Arc<Agent>,
}

impl LocalTransport {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }
}

impl Transport for LocalTransport {
    async fn list(&self) -> Result<Vec<Identifier>> {
        Ok(self.agent.list())
    }

    async fn get(&self, name: &str) -> Result<Identifier> {
        Ok(self.agent.get(name)?)
    }

    async fn create(&self, request: CreateRequest) -> Result<Identifier> {
        Ok(self.agent.create(request)?)
    }

    async fn update(&self, name: &str, request: UpdateRequest) -> Result<Identifier> {
        Ok(self.agent.update(name, request)?)
    }

    async fn add_end_role(&self, name: &str, reply: SignedEvent) -> Result<Vec<EndRole>> {
        Ok(self.agent.add_end_role(name, reply)?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        Ok(self.agent.delete(name)?)
    }
}

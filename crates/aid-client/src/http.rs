//! Submission to a remote agent over HTTP.

use crate::error::{ClientError, Result};
use crate::transport::Transport;
use aid_agent::{AgentError, CreateRequest, Identifier, UpdateRequest};
use aid_core::SignedEvent;
use aid_core::event::EndRole;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to the agent service routes under `/identifiers`.
#[derive(Clone)]
pub struct HttpTransport {
    base: Url,
    client: Client,
}

impl HttpTransport {
    /// Transport for the agent at `base_url`, e.g. `http://127.0.0.1:8600`.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::Transport(format!("invalid agent url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Transport(format!(
                "invalid agent url {base_url}: not a base url"
            )));
        }
        Ok(Self {
            base,
            client: Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("{} is not a base url", self.base)))?
            .pop_if_empty()
            .push("identifiers")
            .extend(segments);
        Ok(url)
    }

    /// Decode a success body, or turn the agent's error into a client error.
    async fn read<T: DeserializeOwned>(response: Response, name: &str) -> Result<T> {
        let response = Self::check(response, name).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Transport(format!("invalid agent response: {e}")))
    }

    async fn check(response: Response, name: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        debug!(name, %status, error = %message, "agent returned an error");

        Err(match status {
            StatusCode::NOT_FOUND => AgentError::NotFound(name.to_string()).into(),
            StatusCode::CONFLICT => AgentError::AlreadyExists(name.to_string()).into(),
            _ => ClientError::Transport(format!("agent returned {status}: {message}")),
        })
    }
}

fn send_error(e: reqwest::Error) -> ClientError {
    ClientError::Transport(format!("request to agent failed: {e}"))
}

impl Transport for HttpTransport {
    async fn list(&self) -> Result<Vec<Identifier>> {
        let response = self
            .client
            .get(self.url(&[])?)
            .send()
            .await
            .map_err(send_error)?;
        Self::read(response, "").await
    }

    async fn get(&self, name: &str) -> Result<Identifier> {
        let response = self
            .client
            .get(self.url(&[name])?)
            .send()
            .await
            .map_err(send_error)?;
        Self::read(response, name).await
    }

    async fn create(&self, request: CreateRequest) -> Result<Identifier> {
        let name = request.name.clone();
        let response = self
            .client
            .post(self.url(&[])?)
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;
        Self::read(response, &name).await
    }

    async fn update(&self, name: &str, request: UpdateRequest) -> Result<Identifier> {
        let response = self
            .client
            .put(self.url(&[name])?)
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;
        Self::read(response, name).await
    }

    async fn add_end_role(&self, name: &str, reply: SignedEvent) -> Result<Vec<EndRole>> {
        let response = self
            .client
            .post(self.url(&[name, "endroles"])?)
            .json(&reply)
            .send()
            .await
            .map_err(send_error)?;
        Self::read(response, name).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&[name])?)
            .send()
            .await
            .map_err(send_error)?;
        Self::check(response, name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        let transport = HttpTransport::new("http://127.0.0.1:8600").unwrap();
        assert_eq!(
            transport.url(&[]).unwrap().as_str(),
            "http://127.0.0.1:8600/identifiers"
        );
        assert_eq!(
            transport.url(&["alice", "endroles"]).unwrap().as_str(),
            "http://127.0.0.1:8600/identifiers/alice/endroles"
        );
    }

    #[test]
    fn test_names_are_escaped() {
        let transport = HttpTransport::new("http://agent.local/api/").unwrap();
        assert_eq!(
            transport.url(&["a b/c"]).unwrap().as_str(),
            "http://agent.local/api/identifiers/a%20b%2Fc"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            HttpTransport::new("not a url"),
            Err(ClientError::Transport(_))
        ));
        assert!(matches!(
            HttpTransport::new("mailto:agent@example.com"),
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        // Nothing listens on the discard port.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            transport.list().await,
            Err(ClientError::Transport(_))
        ));
    }
}

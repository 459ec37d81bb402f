//! AID Agent Service
//!
//! Serves an [`Agent`] over HTTP: controllers post signed inceptions,
//! rotations, interactions and end-role replies, and read back the
//! identifiers the agent holds.

use aid_agent::{Agent, AgentError, CreateRequest, UpdateRequest};
use aid_core::SignedEvent;
use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::warn;

/// Agent service configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 8600).into(),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `LISTEN_ADDR`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .with_context(|| format!("invalid LISTEN_ADDR: {addr}"))?;
        }
        Ok(config)
    }
}

pub type AppState = Arc<Agent>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: AgentError) -> Response {
    let status = match &err {
        AgentError::NotFound(_) => StatusCode::NOT_FOUND,
        AgentError::AlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    warn!("Request rejected: {}", err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health(State(agent): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "aid-agent",
        "identifiers": agent.count(),
    }))
}

async fn list_identifiers(State(agent): State<AppState>) -> impl IntoResponse {
    Json(agent.list())
}

async fn create_identifier(
    State(agent): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Response {
    match agent.create(request) {
        Ok(identifier) => (StatusCode::CREATED, Json(identifier)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_identifier(State(agent): State<AppState>, Path(name): Path<String>) -> Response {
    match agent.get(&name) {
        Ok(identifier) => Json(identifier).into_response(),
        Err(e) => error_response(e),
    }
}

/// Accept a rotation or interaction.
async fn update_identifier(
    State(agent): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    match agent.update(&name, request) {
        Ok(identifier) => Json(identifier).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_identifier(State(agent): State<AppState>, Path(name): Path<String>) -> Response {
    match agent.delete(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Accept an end-role reply and return the identifier's roles.
async fn add_end_role(
    State(agent): State<AppState>,
    Path(name): Path<String>,
    Json(reply): Json<SignedEvent>,
) -> Response {
    match agent.add_end_role(&name, reply) {
        Ok(roles) => Json(roles).into_response(),
        Err(e) => error_response(e),
    }
}

/// Build the router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/identifiers",
            get(list_identifiers).post(create_identifier),
        )
        .route(
            "/identifiers/:name",
            get(get_identifier)
                .put(update_identifier)
                .delete(delete_identifier),
        )
        .route("/identifiers/:name/endroles", post(add_end_role))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

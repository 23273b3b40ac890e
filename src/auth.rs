use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use std::sync::Arc;

use crate::AppState;

pub const ACTOR_HEADER: &str = "x-actor";

/// Name recorded in the audit log for the caller.
///
/// Taken from the `X-Actor` header set by the fronting proxy, falling back to
/// the configured default actor. A non-empty `actor` field in a request body
/// takes precedence over this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
    /// Body value if present, otherwise this actor
    pub fn or_body(&self, body_actor: &str) -> String {
        let body_actor = body_actor.trim();
        if body_actor.is_empty() {
            self.0.clone()
        } else {
            body_actor.to_string()
        }
    }
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| state.config.default_actor.clone());
        Ok(Actor(actor))
    }
}

//! Request-scoped security context.
//!
//! Exactly one `SecurityContext` exists per in-flight request. It is created
//! fresh, bound to the request's extensions, and dropped with the request;
//! it is never shared, cached, or reused across requests.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Extensions;
use serde::Serialize;
use uuid::Uuid;

/// The authenticated identity bound to the current request.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityContext {
    /// Resolved principal
    pub principal: String,
    /// Granted roles, exactly as fetched from the role directory
    pub roles: HashSet<String>,
    /// Remote peer address, when known
    pub remote_addr: Option<SocketAddr>,
    /// Identifier for this request-scoped session
    pub session_id: String,
    authenticated: bool,
}

impl SecurityContext {
    /// Whether this context represents a completed authentication.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Transport metadata captured from the inbound request.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    /// Remote peer address
    pub remote_addr: Option<SocketAddr>,
}

/// Bind an authenticated context to the request scope.
///
/// If an authenticated context is already bound, installation is a no-op and
/// the existing context is returned: one authentication per request, no
/// second role lookup. When installing fresh, the granted role set is
/// exactly `roles` — any role claims carried by the negotiation layer were
/// discarded upstream.
pub fn install_context(
    extensions: &mut Extensions,
    principal: &str,
    roles: HashSet<String>,
    transport: &TransportMetadata,
) -> SecurityContext {
    if let Some(existing) = extensions.get::<SecurityContext>() {
        if existing.is_authenticated() {
            return existing.clone();
        }
    }
    let context = SecurityContext {
        principal: principal.to_string(),
        roles,
        remote_addr: transport.remote_addr,
        session_id: Uuid::new_v4().to_string(),
        authenticated: true,
    };
    extensions.insert(context.clone());
    context
}

//! Gateway middleware: the per-request orchestration.
//!
//! Runs once per inbound request and walks
//! `Start → Resolving → Authorizing → Installed`, or exits to `Failed` with
//! a terminal JSON error response. On the failed path the wrapped handler
//! chain never executes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error};

use super::negotiate::Negotiator;
use super::policy::{self, Decision};
use super::resolve::IdentityResolver;
use super::session::{SecurityContext, TransportMetadata, install_context};
use crate::config::SsoConfig;
use crate::directory::RoleDirectory;

/// Shared, immutable gateway state. Built once at startup and read
/// concurrently by every request without synchronization.
pub struct AuthGateway {
    sso: SsoConfig,
    resolver: IdentityResolver,
    directory: Arc<dyn RoleDirectory>,
    negotiator: Arc<dyn Negotiator>,
}

impl AuthGateway {
    /// Assemble the gateway from its collaborators.
    #[must_use]
    pub fn new(
        sso: SsoConfig,
        directory: Arc<dyn RoleDirectory>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        let resolver = IdentityResolver::new(
            sso.cookie_name.clone(),
            sso.cookie_domain.clone(),
            Arc::clone(&negotiator),
        );
        Self {
            sso,
            resolver,
            directory,
            negotiator,
        }
    }

    /// Whether UI access is restricted to administrative roles.
    #[must_use]
    pub fn restricts_non_admin_ui(&self) -> bool {
        self.sso.restrict_non_admin_ui
    }
}

/// The authentication gateway middleware.
///
/// Produces either "proceed to the next handler" (with the security context
/// bound to the request and `Cache-Control: no-cache` on the response) or a
/// terminal error response.
pub async fn gateway_middleware(
    State(gw): State<Arc<AuthGateway>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Start: a valid context from earlier in this exchange means no new work
    if request
        .extensions()
        .get::<SecurityContext>()
        .is_some_and(SecurityContext::is_authenticated)
    {
        let mut response = next.run(request).await;
        set_no_cache(response.headers_mut());
        return response;
    }

    // Resolving: SSO artifact first, negotiation as fallback. A fresh
    // artifact issued by the negotiation is queued in `pending` and merged
    // onto the final response.
    let mut pending = HeaderMap::new();
    let principal = match gw.resolver.resolve(request.headers(), &mut pending).await {
        Ok(principal) => principal,
        Err(e) => {
            error!(error = %e, "authentication failed: no principal resolved");
            let challenge =
                e.is_unauthenticated() && gw.negotiator.offers_challenge(request.headers());
            return failure_response(
                StatusCode::UNAUTHORIZED,
                &format!("User authentication failed: {e}"),
                challenge,
            );
        }
    };

    // Authorizing: roles are fetched fresh for every request; a directory
    // error is fail-closed.
    let roles = match gw.directory.roles_for(&principal).await {
        Ok(roles) => roles,
        Err(e) => {
            error!(principal = %principal, error = %e, "role directory lookup failed, denying");
            return failure_response(
                StatusCode::UNAUTHORIZED,
                "Authorization data is unavailable; access is denied",
                false,
            );
        }
    };
    if let Decision::Deny(reason) = policy::evaluate(&principal, &roles, gw.sso.restrict_non_admin_ui)
    {
        error!(principal = %principal, reason = ?reason, "request denied by policy");
        return failure_response(StatusCode::UNAUTHORIZED, reason.message(), false);
    }

    // Installed: bind the context and forward down the chain
    let transport = TransportMetadata {
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0),
    };
    let context = install_context(request.extensions_mut(), &principal, roles, &transport);
    debug!(
        principal = %context.principal,
        session_id = %context.session_id,
        "security context installed"
    );

    let mut response = next.run(request).await;
    merge_pending(response.headers_mut(), pending);
    set_no_cache(response.headers_mut());
    response
}

/// Append headers queued during resolution (e.g. a freshly issued SSO
/// artifact) onto the outgoing response.
fn merge_pending(headers: &mut HeaderMap, pending: HeaderMap) {
    let mut current = None;
    for (name, value) in pending {
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            headers.append(name.clone(), value);
        }
    }
}

fn set_no_cache(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
}

/// Terminal error response: structured JSON body, anti-framing and
/// anti-caching headers, optional SPNEGO challenge.
fn failure_response(status: StatusCode, message: &str, challenge: bool) -> Response {
    let body = json!({
        "statusCode": status.as_u16(),
        "msgDesc": message,
    });
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json; charset=UTF-8")
        .header("X-Frame-Options", "DENY")
        .header(header::CACHE_CONTROL, "no-cache");
    if challenge {
        builder = builder.header(header::WWW_AUTHENTICATE, "Negotiate");
    }
    builder
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_response_shape() {
        let response = failure_response(StatusCode::UNAUTHORIZED, "expired ticket", false);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=UTF-8"
        );
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert!(headers.get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_failure_response_with_challenge() {
        let response = failure_response(StatusCode::UNAUTHORIZED, "no token", true);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Negotiate"
        );
    }

    #[test]
    fn test_merge_pending_appends_all_values() {
        let mut target = HeaderMap::new();
        let mut pending = HeaderMap::new();
        pending.append(header::SET_COOKIE, "a=1".parse().unwrap());
        pending.append(header::SET_COOKIE, "b=2".parse().unwrap());
        merge_pending(&mut target, pending);
        assert_eq!(target.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_set_no_cache_replaces_existing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, "max-age=3600".parse().unwrap());
        set_no_cache(&mut headers);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get_all(header::CACHE_CONTROL).iter().count(), 1);
    }
}

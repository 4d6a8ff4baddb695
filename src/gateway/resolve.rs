//! Identity resolution: reconcile the SSO artifact with live negotiation.
//!
//! Precedence (security-critical, preserved from the original deployment):
//! 1. an SSO artifact already queued on the outgoing response (`Set-Cookie`)
//! 2. SSO artifacts on the inbound request (`Cookie`)
//! 3. a live negotiation round trip
//!
//! Step 1 inspects what is about to be written before what was received.
//! Unusual, but it is the observed handshake order: a negotiation that
//! completed earlier in the exchange has already queued the fresh artifact.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, header};
use tracing::{debug, warn};

use super::negotiate::Negotiator;
use crate::Result;

/// Resolves a single principal name for the current request, or fails.
pub struct IdentityResolver {
    cookie_name: String,
    cookie_domain: Option<String>,
    negotiator: Arc<dyn Negotiator>,
}

impl IdentityResolver {
    /// Create a resolver for the given SSO cookie name and domain.
    pub fn new(
        cookie_name: impl Into<String>,
        cookie_domain: Option<String>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookie_domain,
            negotiator,
        }
    }

    /// Resolve the principal for a request.
    ///
    /// `pending` holds headers queued for the outgoing response; a fresh
    /// SSO artifact issued by a completed negotiation is found there first.
    /// On a successful live negotiation this method queues the new artifact
    /// into `pending` itself.
    pub async fn resolve(
        &self,
        request_headers: &HeaderMap,
        pending: &mut HeaderMap,
    ) -> Result<String> {
        // 1. Artifact being issued on this exchange
        if let Some(user) = self.user_from_values(pending.get_all(header::SET_COOKIE).iter()) {
            debug!(user = %user, "principal from outgoing SSO artifact");
            return Ok(user);
        }

        // 2. Previously established artifact on the request
        if let Some(user) = request_headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|header| extract_user_from_cookie_header(header, &self.cookie_name))
        {
            debug!(user = %user, "principal from inbound SSO artifact");
            return Ok(user);
        }

        // 3. Live negotiation
        let token = self.negotiator.negotiate(request_headers).await?;
        debug!(user = %token.user, "principal from negotiation");
        if let Some(cookie) = self.artifact_cookie(&token.raw) {
            pending.append(header::SET_COOKIE, cookie);
        } else {
            warn!("negotiated token not representable as a cookie value; artifact not issued");
        }
        Ok(token.user)
    }

    fn user_from_values<'a>(
        &self,
        values: impl Iterator<Item = &'a HeaderValue>,
    ) -> Option<String> {
        values
            .filter_map(|v| v.to_str().ok())
            .find_map(|artifact| extract_user(artifact, &self.cookie_name))
    }

    /// Build the `Set-Cookie` value carrying a freshly issued artifact.
    fn artifact_cookie(&self, raw_token: &str) -> Option<HeaderValue> {
        let mut cookie = format!("{}=\"{}\"; Path=/; HttpOnly", self.cookie_name, raw_token);
        if let Some(domain) = &self.cookie_domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

/// Extract the embedded username from one SSO artifact string.
///
/// The artifact is a semicolon-delimited attribute string whose leading name
/// token must match `cookie_name` case-insensitively. The username is the
/// substring between a literal `u=` and the next `&` within a segment. A
/// segment with the marker but no terminating `&` yields nothing; scanning
/// continues with the next segment. Never errors on malformed input.
#[must_use]
pub fn extract_user(artifact: &str, cookie_name: &str) -> Option<String> {
    if artifact.is_empty() || cookie_name.is_empty() {
        return None;
    }
    let name_matches = artifact
        .get(..cookie_name.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(cookie_name));
    if !name_matches {
        return None;
    }
    for segment in artifact.split(';') {
        if let Some(user) = user_in_segment(segment) {
            return Some(user);
        }
    }
    None
}

/// Extract the embedded username from a raw `Cookie` header, which may
/// carry several cookie pairs. The header is tried as one whole artifact
/// first, then each semicolon segment is tried as its own artifact so a
/// non-leading SSO cookie is still found.
#[must_use]
pub fn extract_user_from_cookie_header(header: &str, cookie_name: &str) -> Option<String> {
    if let Some(user) = extract_user(header, cookie_name) {
        return Some(user);
    }
    for segment in header.split(';') {
        let segment = segment.trim_start();
        let name_matches = segment
            .get(..cookie_name.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(cookie_name));
        if !cookie_name.is_empty() && name_matches {
            if let Some(user) = user_in_segment(segment) {
                return Some(user);
            }
        }
    }
    None
}

/// `u=<user>&` within one segment; truncated markers yield nothing.
fn user_in_segment(segment: &str) -> Option<String> {
    let start = segment.find("u=")? + 2;
    let rest = segment.get(start..)?;
    let end = rest.find('&')?;
    let user = &rest[..end];
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_user_from_artifact() {
        assert_eq!(
            extract_user("hadoop.auth=u=bob&t=kerberos&e=1700000000", "hadoop.auth"),
            Some("bob".to_string())
        );
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        assert_eq!(
            extract_user("Hadoop.Auth=u=bob&t=kerberos&e=1", "hadoop.auth"),
            Some("bob".to_string())
        );
    }

    #[test]
    fn test_foreign_cookie_ignored() {
        assert_eq!(extract_user("session=u=bob&e=1", "hadoop.auth"), None);
    }

    #[test]
    fn test_multi_segment_artifact() {
        assert_eq!(
            extract_user("name=ssoCookie; u=alice&exp=1700000000", "name"),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_truncated_marker_yields_nothing_without_error() {
        // Marker present but no terminating delimiter
        assert_eq!(extract_user("name=ssoCookie; u=", "name"), None);
        assert_eq!(extract_user("hadoop.auth=u=bob", "hadoop.auth"), None);
    }

    #[test]
    fn test_falls_through_malformed_segment_to_next() {
        // First segment truncated, second one complete
        assert_eq!(
            extract_user("name=x; u=; u=carol&e=5", "name"),
            Some("carol".to_string())
        );
    }

    #[test]
    fn test_cookie_header_with_leading_foreign_cookies() {
        assert_eq!(
            extract_user_from_cookie_header(
                "theme=dark; hadoop.auth=u=bob&t=kerberos&e=1",
                "hadoop.auth"
            ),
            Some("bob".to_string())
        );
        assert_eq!(
            extract_user_from_cookie_header("theme=dark; session=u=bob&e=1", "hadoop.auth"),
            None
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(extract_user("", "hadoop.auth"), None);
        assert_eq!(extract_user("hadoop.auth=u=a&", ""), None);
    }

    mod resolver {
        use super::*;
        use crate::Error;
        use pretty_assertions::assert_eq;
        use crate::gateway::negotiate::{NegotiatedToken, Negotiator};
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Scripted negotiator that counts invocations.
        struct ScriptedNegotiator {
            outcome: std::result::Result<NegotiatedToken, String>,
            calls: AtomicUsize,
        }

        impl ScriptedNegotiator {
            fn success(user: &str) -> Self {
                let payload = NegotiatedToken::payload(user, user, "kerberos", u64::MAX);
                let raw = format!("{payload}&s=sig");
                Self {
                    outcome: Ok(NegotiatedToken::parse(&payload, &raw).unwrap()),
                    calls: AtomicUsize::new(0),
                }
            }

            fn failure(reason: &str) -> Self {
                Self {
                    outcome: Err(reason.to_string()),
                    calls: AtomicUsize::new(0),
                }
            }

            fn call_count(&self) -> usize {
                self.calls.load(Ordering::SeqCst)
            }
        }

        #[async_trait]
        impl Negotiator for ScriptedNegotiator {
            async fn negotiate(&self, _headers: &HeaderMap) -> crate::Result<NegotiatedToken> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match &self.outcome {
                    Ok(token) => Ok(token.clone()),
                    Err(reason) => Err(Error::NegotiationFailed(reason.clone())),
                }
            }
        }

        fn resolver(negotiator: Arc<dyn Negotiator>) -> IdentityResolver {
            IdentityResolver::new("hadoop.auth", None, negotiator)
        }

        #[tokio::test]
        async fn test_cookie_wins_and_negotiator_never_runs() {
            let negotiator = Arc::new(ScriptedNegotiator::success("negotiated"));
            let r = resolver(Arc::clone(&negotiator) as Arc<dyn Negotiator>);

            let mut request = HeaderMap::new();
            request.insert(
                header::COOKIE,
                "hadoop.auth=u=alice&t=kerberos&e=99".parse().unwrap(),
            );
            let mut pending = HeaderMap::new();

            let user = r.resolve(&request, &mut pending).await.unwrap();
            assert_eq!(user, "alice");
            assert_eq!(negotiator.call_count(), 0);
            assert!(pending.get(header::SET_COOKIE).is_none());
        }

        #[tokio::test]
        async fn test_outgoing_artifact_beats_request_cookie() {
            let negotiator = Arc::new(ScriptedNegotiator::success("negotiated"));
            let r = resolver(negotiator);

            let mut request = HeaderMap::new();
            request.insert(
                header::COOKIE,
                "hadoop.auth=u=old&t=kerberos&e=1".parse().unwrap(),
            );
            let mut pending = HeaderMap::new();
            pending.insert(
                header::SET_COOKIE,
                "hadoop.auth=\"u=fresh&t=kerberos&e=9&s=x\"; Path=/"
                    .parse()
                    .unwrap(),
            );

            let user = r.resolve(&request, &mut pending).await.unwrap();
            assert_eq!(user, "fresh");
        }

        #[tokio::test]
        async fn test_negotiation_fallback_issues_artifact() {
            let negotiator = Arc::new(ScriptedNegotiator::success("bob"));
            let r = resolver(Arc::clone(&negotiator) as Arc<dyn Negotiator>);

            let request = HeaderMap::new();
            let mut pending = HeaderMap::new();

            let user = r.resolve(&request, &mut pending).await.unwrap();
            assert_eq!(user, "bob");
            assert_eq!(negotiator.call_count(), 1);
            let cookie = pending.get(header::SET_COOKIE).unwrap().to_str().unwrap();
            assert!(cookie.starts_with("hadoop.auth="));
            assert!(cookie.contains("u=bob&"));
            assert!(cookie.contains("HttpOnly"));
        }

        #[tokio::test]
        async fn test_negotiation_failure_propagates_as_data() {
            let negotiator = Arc::new(ScriptedNegotiator::failure("ticket expired"));
            let r = resolver(negotiator);

            let err = r
                .resolve(&HeaderMap::new(), &mut HeaderMap::new())
                .await
                .unwrap_err();
            match err {
                Error::NegotiationFailed(reason) => assert!(reason.contains("ticket expired")),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_cookie_domain_applied_to_issued_artifact() {
            let negotiator = Arc::new(ScriptedNegotiator::success("bob"));
            let r = IdentityResolver::new(
                "hadoop.auth",
                Some("example.com".to_string()),
                negotiator,
            );
            let mut pending = HeaderMap::new();
            r.resolve(&HeaderMap::new(), &mut pending).await.unwrap();
            let cookie = pending.get(header::SET_COOKIE).unwrap().to_str().unwrap();
            assert!(cookie.ends_with("Domain=example.com"));
        }
    }
}

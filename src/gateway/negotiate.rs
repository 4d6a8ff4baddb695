//! Negotiation adapter: wraps the external challenge/response mechanism
//! behind a trait so the gateway never interprets protocol internals beyond
//! the resolved principal and the failure cause.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::signer::Signer;
use crate::config::SsoConfig;
use crate::{Error, Result};

/// Outcome of a successful negotiation round trip.
///
/// `roles` is whatever the negotiation layer happened to know about the
/// principal. It is never authoritative: the session installer discards it
/// and uses the role directory instead.
#[derive(Debug, Clone)]
pub struct NegotiatedToken {
    /// Short user name the request authenticates as
    pub user: String,
    /// Full principal (user plus realm where the mechanism has one)
    pub principal: String,
    /// Mechanism that produced the token (e.g. `kerberos`)
    pub token_type: String,
    /// Expiry, milliseconds since the Unix epoch
    pub expires: u64,
    /// Incidental role claims from the negotiation layer (ignored)
    pub roles: Vec<String>,
    /// The signed wire form of this token
    pub raw: String,
}

impl NegotiatedToken {
    /// Parse the attribute-string payload (`u=...&p=...&t=...&e=...`,
    /// signature already stripped). `raw` is the full signed string.
    pub fn parse(payload: &str, raw: &str) -> Result<Self> {
        let mut user = None;
        let mut principal = None;
        let mut token_type = None;
        let mut expires = None;
        for field in payload.split('&') {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            match key {
                "u" => user = Some(value.to_string()),
                "p" => principal = Some(value.to_string()),
                "t" => token_type = Some(value.to_string()),
                "e" => {
                    expires = Some(value.parse::<u64>().map_err(|_| {
                        Error::InvalidToken(format!("unparseable expiry: {value}"))
                    })?);
                }
                _ => {}
            }
        }
        let user = user
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidToken("token carries no user".to_string()))?;
        let principal = principal.unwrap_or_else(|| user.clone());
        Ok(Self {
            user,
            principal,
            token_type: token_type.unwrap_or_else(|| "kerberos".to_string()),
            expires: expires
                .ok_or_else(|| Error::InvalidToken("token carries no expiry".to_string()))?,
            roles: Vec::new(),
            raw: raw.to_string(),
        })
    }

    /// Build the unsigned attribute-string payload for a token.
    #[must_use]
    pub fn payload(user: &str, principal: &str, token_type: &str, expires: u64) -> String {
        format!("u={user}&p={principal}&t={token_type}&e={expires}")
    }

    /// Whether the token is expired at `now` (millis since epoch).
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires < now
    }
}

/// Performs the negotiation round trip for a request that presented no SSO
/// artifact. Failure is data (`Error::NegotiationFailed`), never a fault.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Attempt the negotiation; yields the resolved token or a failure.
    async fn negotiate(&self, headers: &HeaderMap) -> Result<NegotiatedToken>;

    /// Whether a failure response to this request should carry a
    /// `WWW-Authenticate: Negotiate` challenge.
    fn offers_challenge(&self, _headers: &HeaderMap) -> bool {
        false
    }
}

/// SPNEGO-style negotiator.
///
/// Reads `Authorization: Negotiate <base64>` and verifies the transported
/// signed token (signature, expiry). The GSSAPI exchange itself lives behind
/// the portal that issued the token; this adapter only validates and
/// extracts, per the gateway's contract.
pub struct SpnegoNegotiator {
    config: SsoConfig,
    signer: Arc<Signer>,
    service_principal: String,
}

impl SpnegoNegotiator {
    /// Create a negotiator from the SSO configuration and token signer.
    #[must_use]
    pub fn new(config: SsoConfig, signer: Arc<Signer>) -> Self {
        let service_principal = config.service_principal();
        Self {
            config,
            signer,
            service_principal,
        }
    }

    /// The resolved service principal this negotiator accepts tokens for.
    #[must_use]
    pub fn service_principal(&self) -> &str {
        &self.service_principal
    }

    /// Issue a fresh signed token for `user`, valid for the configured
    /// window from now.
    pub fn issue(&self, user: &str, principal: &str) -> Result<NegotiatedToken> {
        let expires = now_millis() + self.config.token_validity.as_millis() as u64;
        let payload = NegotiatedToken::payload(user, principal, "kerberos", expires);
        let raw = self.signer.sign(&payload)?;
        NegotiatedToken::parse(&payload, &raw)
    }

    fn extract_wire_token(headers: &HeaderMap) -> Result<String> {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| Error::NegotiationFailed("no Authorization header".to_string()))?;
        let token = authorization
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Negotiate "))
            .ok_or_else(|| {
                Error::NegotiationFailed("Authorization header is not Negotiate".to_string())
            })?;
        let decoded = STANDARD
            .decode(token.trim())
            .map_err(|e| Error::NegotiationFailed(format!("undecodable token: {e}")))?;
        String::from_utf8(decoded)
            .map_err(|_| Error::NegotiationFailed("token is not valid UTF-8".to_string()))
    }
}

#[async_trait]
impl Negotiator for SpnegoNegotiator {
    async fn negotiate(&self, headers: &HeaderMap) -> Result<NegotiatedToken> {
        let wire = Self::extract_wire_token(headers)?;
        let payload = self
            .signer
            .verify(&wire)
            .map_err(|e| Error::NegotiationFailed(e.to_string()))?;
        let token = NegotiatedToken::parse(payload, &wire)
            .map_err(|e| Error::NegotiationFailed(e.to_string()))?;
        let now = now_millis();
        if token.is_expired_at(now) {
            return Err(Error::NegotiationFailed(format!(
                "ticket expired at {} (now {now})",
                token.expires
            )));
        }
        debug!(user = %token.user, token_type = %token.token_type, "negotiation succeeded");
        Ok(token)
    }

    fn offers_challenge(&self, headers: &HeaderMap) -> bool {
        // With alt negotiation on, browsers are sent back to the SSO portal
        // instead of being challenged; non-browsers get the SPNEGO dance.
        if !self.config.alt_negotiation_enabled {
            return true;
        }
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        self.config.is_non_browser(user_agent)
    }
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

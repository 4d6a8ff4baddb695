//! SSO / SPNEGO Authentication Gateway
//!
//! Intercepts every inbound HTTP request, reconciles two credential-proof
//! mechanisms (a pre-existing SSO cookie versus a live SPNEGO-style
//! negotiation), derives an authoritative identity and role set from a role
//! directory, and installs a request-scoped security context before the
//! request reaches any protected handler.
//!
//! # Resolution precedence
//!
//! 1. SSO artifact already queued on the outgoing response (`Set-Cookie`)
//! 2. SSO artifact on the inbound request (`Cookie`)
//! 3. Live negotiation via the `Authorization: Negotiate` header
//!
//! A request for which none of the three yields a principal is answered with
//! a structured JSON error; the downstream handler chain never runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}

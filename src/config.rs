//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
///
/// Loaded once at process startup and shared read-only (`Arc`) by every
/// in-flight request. No request may mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// SSO / negotiation configuration
    pub sso: SsoConfig,
    /// Role directory configuration
    pub directory: DirectoryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// SSO / negotiation configuration
///
/// The full surface the negotiation mechanism is configured with. Several
/// fields (portal, account/cluster identifiers, certificate directory) are
/// opaque to the gateway itself: they are handed to the negotiation layer
/// and logged at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoConfig {
    /// Signature algorithm for issued tokens
    pub algorithm: String,
    /// Directory holding the SSO portal's certificate material
    pub certificate_dir: String,
    /// SSO portal identifier
    pub portal: String,
    /// Account identifier forwarded to the negotiation layer
    pub account_id: String,
    /// Cluster identifier forwarded to the negotiation layer
    pub cluster_id: String,
    /// Enable the alternate (portal-token) negotiation path for browsers
    pub alt_negotiation_enabled: bool,
    /// File containing the token signature secret. When unset an ephemeral
    /// secret is generated at startup (tokens then die with the process).
    pub signature_secret_file: Option<String>,
    /// Validity window for issued tokens
    #[serde(with = "humantime_serde")]
    pub token_validity: Duration,
    /// Domain attribute for the issued SSO cookie
    pub cookie_domain: Option<String>,
    /// Name of the SSO cookie carrying the signed token
    pub cookie_name: String,
    /// User-agent substrings identifying non-browser clients. Non-browsers
    /// are offered a `WWW-Authenticate: Negotiate` challenge on failure;
    /// browsers are expected to come back through the SSO portal.
    pub non_browser_user_agents: Vec<String>,
    /// Negotiation service principal. `_HOST` is substituted with
    /// `service_host`.
    pub principal: String,
    /// Negotiation credential reference (keytab path or equivalent)
    pub keytab: String,
    /// Hostname this service runs as (for `_HOST` substitution)
    pub service_host: String,
    /// Restrict the UI to administrative roles. When set, a resolved
    /// principal whose role set lacks the admin marker is denied.
    pub restrict_non_admin_ui: bool,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            algorithm: "HMAC-SHA256".to_string(),
            certificate_dir: String::new(),
            portal: String::new(),
            account_id: String::new(),
            cluster_id: String::new(),
            alt_negotiation_enabled: true,
            signature_secret_file: None,
            token_validity: Duration::from_secs(36_000),
            cookie_domain: None,
            cookie_name: "hadoop.auth".to_string(),
            non_browser_user_agents: vec![
                "java".to_string(),
                "curl".to_string(),
                "wget".to_string(),
                "perl".to_string(),
            ],
            principal: String::new(),
            keytab: String::new(),
            service_host: String::new(),
            restrict_non_admin_ui: false,
        }
    }
}

impl SsoConfig {
    /// Resolve the negotiation service principal, substituting `_HOST`
    /// with the configured service hostname.
    #[must_use]
    pub fn service_principal(&self) -> String {
        if self.principal.contains("_HOST") && !self.service_host.is_empty() {
            self.principal.replace("_HOST", &self.service_host)
        } else {
            self.principal.clone()
        }
    }

    /// Whether a user agent identifies a non-browser client.
    /// A missing user agent is treated as a non-browser.
    #[must_use]
    pub fn is_non_browser(&self, user_agent: Option<&str>) -> bool {
        let Some(ua) = user_agent else {
            return true;
        };
        let ua = ua.to_lowercase();
        self.non_browser_user_agents
            .iter()
            .any(|agent| !agent.is_empty() && ua.contains(&agent.to_lowercase()))
    }
}

/// Role directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DirectoryConfig {
    /// YAML file mapping principals to role lists. When unset the directory
    /// starts empty (every principal resolves to an empty role set).
    pub roles_file: Option<String>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (AUTH_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Expand ${VAR} in path-like values
        config.expand_env_vars();

        Ok(config)
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = match Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
            Ok(re) => re,
            Err(_) => return,
        };

        if let Some(secret_file) = &mut self.sso.signature_secret_file {
            *secret_file = Self::expand_string(&re, secret_file);
        }
        self.sso.certificate_dir = Self::expand_string(&re, &self.sso.certificate_dir);
        self.sso.keytab = Self::expand_string(&re, &self.sso.keytab);
        if let Some(roles_file) = &mut self.directory.roles_file {
            *roles_file = Self::expand_string(&re, roles_file);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "10h")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

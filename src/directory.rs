//! Role directory: the source of authoritative authorization data.
//!
//! Roles are fetched fresh for every request; nothing is cached across
//! requests, so each request observes the directory's current state.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{Error, Result};

/// Looks up the authorization roles known for a resolved principal.
///
/// Backed by an external user store in production. A lookup for an unknown
/// principal returns an empty set, never an error; an error from this trait
/// means the store itself is unreachable and is treated fail-closed by the
/// gateway.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Return the role set for `principal`. Unknown principals yield an
    /// empty set.
    async fn roles_for(&self, principal: &str) -> Result<HashSet<String>>;
}

/// In-memory role directory, optionally seeded from a YAML file of the form
///
/// ```yaml
/// alice: [ROLE_SYS_ADMIN, ROLE_USER]
/// bob: [ROLE_USER]
/// ```
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
    roles: RwLock<HashMap<String, HashSet<String>>>,
}

impl StaticRoleDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the directory from a YAML mapping of principal to role list.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: HashMap<String, Vec<String>> = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid roles file {}: {e}", path.display())))?;
        let roles = parsed
            .into_iter()
            .map(|(user, list)| (user, list.into_iter().collect()))
            .collect();
        Ok(Self {
            roles: RwLock::new(roles),
        })
    }

    /// Insert or replace the role set for a principal.
    pub fn set_roles(&self, principal: &str, roles: impl IntoIterator<Item = String>) {
        if let Ok(mut map) = self.roles.write() {
            map.insert(principal.to_string(), roles.into_iter().collect());
        }
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn roles_for(&self, principal: &str) -> Result<HashSet<String>> {
        let map = self
            .roles
            .read()
            .map_err(|_| Error::DirectoryUnavailable("directory lock poisoned".to_string()))?;
        Ok(map.get(principal).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_unknown_principal_yields_empty_set() {
        let dir = StaticRoleDirectory::new();
        let roles = dir.roles_for("nobody").await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_fetch_roles() {
        let dir = StaticRoleDirectory::new();
        dir.set_roles("alice", ["ROLE_SYS_ADMIN".to_string(), "ROLE_USER".to_string()]);
        let roles = dir.roles_for("alice").await.unwrap();
        assert!(roles.contains("ROLE_SYS_ADMIN"));
        assert!(roles.contains("ROLE_USER"));
        assert_eq!(roles.len(), 2);
    }

    #[tokio::test]
    async fn test_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roles.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "alice: [ROLE_SYS_ADMIN]").unwrap();
        writeln!(f, "bob: [ROLE_USER]").unwrap();
        drop(f);

        let dir = StaticRoleDirectory::from_file(&path).unwrap();
        assert!(dir.roles_for("alice").await.unwrap().contains("ROLE_SYS_ADMIN"));
        assert!(dir.roles_for("bob").await.unwrap().contains("ROLE_USER"));
        assert!(dir.roles_for("carol").await.unwrap().is_empty());
    }

    #[test]
    fn test_from_file_rejects_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roles.yaml");
        std::fs::write(&path, "alice: {not: [a, list").unwrap();
        assert!(StaticRoleDirectory::from_file(&path).is_err());
    }
}

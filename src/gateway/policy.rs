//! Authorization policy: decides whether a resolved principal may proceed.

use std::collections::HashSet;

/// The administrative role marker. Comparison against it is
/// case-insensitive; all other role matching in the system is exact-string.
pub const ADMIN_ROLE: &str = "ROLE_SYS_ADMIN";

/// Policy outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request may proceed
    Allow,
    /// Request is refused
    Deny(DenyReason),
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No principal was resolved for the request
    NoPrincipal,
    /// UI access is restricted to administrators and the principal has no
    /// administrative role
    AdminOnly,
}

impl DenyReason {
    /// Client-facing description of the refusal.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoPrincipal => {
                "User authentication failed: the user details cannot be fetched from the portal"
            }
            Self::AdminOnly => {
                "Non-admin users cannot access the administration UI. \
                 Please contact your administrator to request access."
            }
        }
    }
}

/// Evaluate the admission policy for a resolved principal.
#[must_use]
pub fn evaluate(principal: &str, roles: &HashSet<String>, restrict_non_admin_ui: bool) -> Decision {
    if principal.trim().is_empty() {
        return Decision::Deny(DenyReason::NoPrincipal);
    }
    if restrict_non_admin_ui && !has_admin_role(roles) {
        return Decision::Deny(DenyReason::AdminOnly);
    }
    Decision::Allow
}

/// Whether the role set contains the administrative marker.
#[must_use]
pub fn has_admin_role(roles: &HashSet<String>) -> bool {
    roles.iter().any(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
}

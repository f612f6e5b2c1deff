//! Trust-fabric primitives: governance role sets.
//!
//! Governance-only mutations carry an `x-governance-role` header. The header
//! value is normalized (trimmed, lowercased) and checked against an allow
//! set configured as a comma-separated list, where `*` means allow-any.

use std::collections::BTreeSet;

/// Default allow set for dispute assignment.
pub const DEFAULT_DISPUTE_ASSIGN_ROLES: &str = "ops_admin,ops_agent,admin";

/// Default allow set for dispute resolution.
pub const DEFAULT_DISPUTE_RESOLVE_ROLES: &str = "ops_admin,ops_lead,admin";

/// Default allow set for reconciliation unfreeze.
pub const DEFAULT_UNFREEZE_ROLES: &str = "ops_admin,admin";

/// Normalizes a role header value: trim and lowercase.
#[must_use]
pub fn normalize_role(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A parsed governance allow set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    allow_any: bool,
    roles: BTreeSet<String>,
}

impl RoleSet {
    /// Parses a comma-separated role list. A `*` entry allows any role.
    /// Entries are normalized; empty entries are dropped.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut allow_any = false;
        let mut roles = BTreeSet::new();
        for entry in input.split(',') {
            let normalized = normalize_role(entry);
            if normalized.is_empty() {
                continue;
            }
            if normalized == "*" {
                allow_any = true;
            } else {
                roles.insert(normalized);
            }
        }
        Self { allow_any, roles }
    }

    /// True when the (already normalized) role is allowed.
    #[must_use]
    pub fn allows(&self, role: &str) -> bool {
        self.allow_any || self.roles.contains(role)
    }

    /// True when the set matches nothing (empty list without `*`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.allow_any && self.roles.is_empty()
    }
}

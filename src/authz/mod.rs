//! Authorization engine.
//!
//! Hierarchical role-based access control over a fixed context graph:
//! - contexts (organization, workspace, project) carry roles
//! - products (task) have no roles and inherit from their ancestor contexts
//! - a declarative policy table maps (subject type, granting context, role)
//!   to CRUD bits
//! - a user's memberships are evaluated with OR semantics across every level
//!   of the subject's hierarchy

pub mod adapters;
pub mod defaults;
mod evaluator;
mod flow;
mod graph;
mod policy;
mod principal;
mod subject;

pub use adapters::{
    adapt_membership, adapt_memberships, adapt_subject, parse_entity, parse_membership, RawEntity, RawMembership,
};
pub use evaluator::PermissionManager;
pub use flow::{DenialReason, EntityResolver, EntityStore, MembershipStore, Resolution};
pub use graph::{ContextGraph, EntityKind};
pub use policy::{Crud, Permissions, PolicyRow, PolicyTable, PolicyTableBuilder, SubjectPolicy};
pub use principal::{CurrentUser, RequestScope, SystemRole};
pub use subject::{Ancestors, Membership, Subject};

use std::str::FromStr;

/// How the user's system role combines with the resolver's decision in the
/// resolution flow.
///
/// `LegacyInverted` reproduces one historical call site that computed
/// `allowed || role != admin`. It grants access to every non-admin whenever
/// the resolver denies, and denies system admins. It is kept selectable so
/// deployments relying on it keep their behaviour; it is not the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BypassRule {
    /// `allowed || role == admin`
    #[default]
    SystemAdmin,
    /// `allowed || role != admin`
    LegacyInverted,
    /// The resolver's decision alone.
    Disabled,
}

impl BypassRule {
    pub fn apply(self, allowed: bool, user: &CurrentUser) -> bool {
        match self {
            BypassRule::SystemAdmin => allowed || user.is_system_admin(),
            BypassRule::LegacyInverted => allowed || !user.is_system_admin(),
            BypassRule::Disabled => allowed,
        }
    }
}

impl FromStr for BypassRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "system-admin" => Ok(BypassRule::SystemAdmin),
            "legacy-inverted" => Ok(BypassRule::LegacyInverted),
            "none" | "off" => Ok(BypassRule::Disabled),
            other => Err(format!("unknown bypass rule `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parses_bypass_spellings() {
        for (input, rule) in [
            ("admin", BypassRule::SystemAdmin),
            ("system-admin", BypassRule::SystemAdmin),
            (" ADMIN ", BypassRule::SystemAdmin),
            ("legacy-inverted", BypassRule::LegacyInverted),
            ("Legacy-Inverted", BypassRule::LegacyInverted),
            ("none", BypassRule::Disabled),
            ("off", BypassRule::Disabled),
        ] {
            assert_eq!(input.parse::<BypassRule>(), Ok(rule), "{input:?}");
        }
    }

    #[test]
    fn rejects_unknown_bypass() {
        for input in ["", "admins", "inverted", "legacy_inverted", "true"] {
            assert!(input.parse::<BypassRule>().is_err(), "{input:?} was accepted");
        }
    }

    #[test]
    fn bypass_outcomes_on_denial() {
        let admin = CurrentUser::new(Uuid::new_v4()).with_role(SystemRole::Admin);
        let user = CurrentUser::new(Uuid::new_v4());

        assert!(BypassRule::SystemAdmin.apply(false, &admin));
        assert!(!BypassRule::SystemAdmin.apply(false, &user));
        assert!(!BypassRule::LegacyInverted.apply(false, &admin));
        assert!(BypassRule::LegacyInverted.apply(false, &user));
        assert!(!BypassRule::Disabled.apply(false, &admin));

        for rule in [BypassRule::SystemAdmin, BypassRule::LegacyInverted, BypassRule::Disabled] {
            assert!(rule.apply(true, &admin));
            assert!(rule.apply(true, &user));
        }
    }
}

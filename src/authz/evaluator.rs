use super::graph::ContextGraph;
use super::policy::{Crud, PolicyTable, PolicyTableBuilder};
use super::subject::{Membership, Subject};
use crate::errors::ConfigError;

/// The context graph and the policy table validated against it.
///
/// Built once at startup and shared read-only (`Arc<PermissionManager>`)
/// across request handlers.
#[derive(Debug, Clone)]
pub struct PermissionManager {
    graph: ContextGraph,
    policy: PolicyTable,
}

impl PermissionManager {
    pub fn new(graph: ContextGraph, policy: PolicyTableBuilder) -> Result<Self, ConfigError> {
        let policy = policy.build(&graph)?;
        tracing::info!(grants = policy.len(), "permission manager configured");
        Ok(Self { graph, policy })
    }

    pub fn graph(&self) -> &ContextGraph {
        &self.graph
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Whether any of `memberships` allows `action` on `subject`.
    ///
    /// Evaluation:
    /// 1. no subject -> deny
    /// 2. skip memberships whose context cannot grant on the subject's type
    /// 3. skip memberships not scoped to the subject or one of its ancestors
    /// 4. the first governing membership whose bitmask has `action` -> allow
    /// 5. deny
    ///
    /// There is no deny bit. A weaker grant at one level never cancels a
    /// stronger one at another.
    pub fn is_allowed(&self, memberships: &[Membership], action: Crud, subject: Option<&Subject>) -> bool {
        let Some(subject) = subject else {
            tracing::debug!(action = %action, "no subject, denied");
            return false;
        };

        let Some(grantors) = self.graph.grantors_of(&subject.entity_type) else {
            tracing::debug!(
                subject_type = %subject.entity_type,
                action = %action,
                "unregistered subject type, denied"
            );
            return false;
        };

        for membership in memberships {
            if !grantors.contains(&membership.context_name) {
                continue;
            }
            if !membership.governs(subject) {
                continue;
            }

            let bitmask = self.policy.bitmask_for(
                &subject.entity_type,
                &membership.context_name,
                &membership.role_name,
            );
            if bitmask.allows(action) {
                tracing::debug!(
                    subject_type = %subject.entity_type,
                    subject_key = %subject.key,
                    action = %action,
                    context = %membership.context_name,
                    context_key = %membership.context_key,
                    role = %membership.role_name,
                    "membership grant"
                );
                return true;
            }
        }

        tracing::debug!(
            subject_type = %subject.entity_type,
            subject_key = %subject.key,
            action = %action,
            memberships = memberships.len(),
            "permission denied"
        );
        false
    }
}

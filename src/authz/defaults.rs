//! Built-in hierarchy and grants.
//!
//! ```text
//! organization [admin, member]
//!   ├── workspace [admin, member]
//!   └── project   [admin, member]
//!         └── task (product)
//! ```

use super::graph::ContextGraph;
use super::policy::{Permissions, PolicyTable, PolicyTableBuilder};
use crate::errors::ConfigError;

pub const ORGANIZATION: &str = "organization";
pub const WORKSPACE: &str = "workspace";
pub const PROJECT: &str = "project";
pub const TASK: &str = "task";

/// Entity types the resolution flow accepts unless configured otherwise.
pub const ENTITY_TYPES: [&str; 3] = [ORGANIZATION, WORKSPACE, PROJECT];

/// Well-known context role names.
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const MEMBER: &str = "member";
}

pub fn context_graph() -> Result<ContextGraph, ConfigError> {
    let mut graph = ContextGraph::new();
    graph.register_context(ORGANIZATION, [roles::ADMIN, roles::MEMBER], &[])?;
    graph.register_context(WORKSPACE, [roles::ADMIN, roles::MEMBER], &[ORGANIZATION])?;
    graph.register_context(PROJECT, [roles::ADMIN, roles::MEMBER], &[ORGANIZATION])?;
    graph.register_product(TASK, &[PROJECT])?;
    Ok(graph)
}

pub fn policy() -> PolicyTableBuilder {
    use roles::{ADMIN, MEMBER};

    let read_only = Permissions::from_flags(0, 1, 0, 0);
    let manage = Permissions::from_flags(0, 1, 1, 1);

    PolicyTable::builder()
        .configure(ORGANIZATION, |p| {
            p.grant(ORGANIZATION, ADMIN, Permissions::ALL)
                .grant(ORGANIZATION, MEMBER, read_only);
        })
        .configure(WORKSPACE, |p| {
            p.grant(ORGANIZATION, ADMIN, Permissions::ALL)
                .grant(WORKSPACE, ADMIN, manage)
                .grant(WORKSPACE, MEMBER, read_only);
        })
        .configure(PROJECT, |p| {
            p.grant(ORGANIZATION, ADMIN, Permissions::ALL)
                .grant(PROJECT, ADMIN, manage)
                .grant(PROJECT, MEMBER, read_only);
        })
        .configure(TASK, |p| {
            p.grant(ORGANIZATION, ADMIN, Permissions::ALL)
                .grant(PROJECT, ADMIN, Permissions::ALL)
                .grant(PROJECT, MEMBER, Permissions::ALL);
        })
}

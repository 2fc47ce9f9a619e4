use cella_authz::authz::{defaults, ContextGraph, PermissionManager, Permissions, PolicyRow, PolicyTable};
use cella_authz::config::AuthzConfig;
use cella_authz::errors::ConfigError;

#[test]
fn unknown_parent_fails_before_serving() {
    let mut graph = ContextGraph::new();
    let err = graph
        .register_context("workspace", ["admin", "member"], &["organization"])
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownParent { .. }));
    assert!(err.to_string().contains("organization"));
}

#[test]
fn policy_referencing_undeclared_role_fails() {
    let graph = defaults::context_graph().unwrap();
    let policy = defaults::policy().row(PolicyRow::new(
        "task",
        "project",
        "owner",
        Permissions::ALL,
    ));

    let err = PermissionManager::new(graph, policy).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRole { ref role, .. } if role == "owner"));
}

#[test]
fn policy_referencing_undeclared_context_fails() {
    let graph = defaults::context_graph().unwrap();
    let policy = PolicyTable::builder().configure("task", |p| {
        p.grant("team", "admin", Permissions::ALL);
    });

    assert!(matches!(
        PermissionManager::new(graph, policy),
        Err(ConfigError::UnknownContext { .. })
    ));
}

#[test]
fn default_configuration_builds() {
    let manager = AuthzConfig::default().permission_manager().unwrap();
    assert_eq!(manager.policy().len(), 11);
    assert!(manager.graph().is_product(defaults::TASK));
}

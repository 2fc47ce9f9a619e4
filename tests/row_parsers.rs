use sqlx::SqlitePool;

use cella_authz::authz::adapt_membership;
use cella_authz::db::row_parsers::{raw_entity_from_row, raw_membership_from_row};

async fn setup_pool() -> SqlitePool {
    SqlitePool::connect("sqlite::memory:").await.expect("connect")
}

#[tokio::test]
async fn parse_entity_row_with_null_columns() {
    let pool = setup_pool().await;
    let row = sqlx::query(
        "SELECT 'org1' AS id, 'acme' AS slug, 'Acme' AS name, NULL AS organization_id, NULL AS workspace_id, NULL AS project_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    let parsed = raw_entity_from_row("organization", &row).expect("parse");
    assert_eq!(parsed.entity, "organization");
    assert_eq!(parsed.id, "org1");
    assert_eq!(parsed.slug.as_deref(), Some("acme"));
    assert!(parsed.organization_id.is_none());
}

#[tokio::test]
async fn parse_entity_row_rejects_empty_id() {
    let pool = setup_pool().await;
    let row = sqlx::query(
        "SELECT '' AS id, NULL AS slug, NULL AS name, NULL AS organization_id, NULL AS workspace_id, NULL AS project_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert!(raw_entity_from_row("project", &row).is_err());
}

#[tokio::test]
async fn parse_entity_row_missing_column_is_an_error() {
    let pool = setup_pool().await;
    let row = sqlx::query("SELECT 'p1' AS id, 'launch' AS slug")
        .fetch_one(&pool)
        .await
        .unwrap();

    let err = raw_entity_from_row("project", &row).unwrap_err();
    assert!(err.to_string().contains("missing name"));
}

#[tokio::test]
async fn parse_membership_row_and_adapt() {
    let pool = setup_pool().await;
    sqlx::query(
        "CREATE TABLE memberships (id TEXT, user_id TEXT, type TEXT, role TEXT, organization_id TEXT, workspace_id TEXT, project_id TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO memberships VALUES ('m1', 'u1', 'PROJECT', 'admin', 'org1', NULL, 'p1')")
        .execute(&pool)
        .await
        .unwrap();

    let row = sqlx::query("SELECT * FROM memberships WHERE id = 'm1'")
        .fetch_one(&pool)
        .await
        .unwrap();

    let raw = raw_membership_from_row(&row).expect("parse");
    assert_eq!(raw.id.as_deref(), Some("m1"));
    assert_eq!(raw.membership_type, "PROJECT");
    assert!(raw.workspace_id.is_none());

    let membership = adapt_membership(&raw).expect("adapt");
    assert_eq!(membership.context_name, "project");
    assert_eq!(membership.context_key, "p1");
}

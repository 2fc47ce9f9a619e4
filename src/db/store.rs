use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::row_parsers::{raw_entity_from_row, raw_membership_from_row};
use crate::authz::{EntityStore, MembershipStore, RawEntity, RawMembership};
use crate::errors::AppResult;

/// Entity and membership lookups backed by the SQLite schema in `migrations/`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn entity_query(entity_type: &str) -> Option<&'static str> {
    let sql = match entity_type {
        "organization" => {
            "SELECT id, slug, name, NULL AS organization_id, NULL AS workspace_id, NULL AS project_id \
             FROM organizations WHERE id = ?1 OR slug = ?1 LIMIT 1"
        }
        "workspace" => {
            "SELECT id, slug, name, organization_id, NULL AS workspace_id, NULL AS project_id \
             FROM workspaces WHERE id = ?1 OR slug = ?1 LIMIT 1"
        }
        "project" => {
            "SELECT id, slug, name, organization_id, NULL AS workspace_id, NULL AS project_id \
             FROM projects WHERE id = ?1 OR slug = ?1 LIMIT 1"
        }
        "task" => {
            "SELECT id, NULL AS slug, summary AS name, organization_id, NULL AS workspace_id, project_id \
             FROM tasks WHERE id = ?1 LIMIT 1"
        }
        _ => return None,
    };
    Some(sql)
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn entity_by_id_or_slug(&self, entity_type: &str, id_or_slug: &str) -> AppResult<Option<RawEntity>> {
        let Some(sql) = entity_query(entity_type) else {
            tracing::debug!(entity_type = %entity_type, "no table for entity type");
            return Ok(None);
        };

        let row = sqlx::query(sql)
            .bind(id_or_slug)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| raw_entity_from_row(entity_type, &r)).transpose()
    }
}

#[async_trait]
impl MembershipStore for SqliteStore {
    async fn memberships_for_user(&self, user_id: Uuid) -> AppResult<Vec<RawMembership>> {
        let rows = sqlx::query(
            "SELECT id, user_id, type, role, organization_id, workspace_id, project_id \
             FROM memberships WHERE user_id = ? AND archived = 0 ORDER BY created_at",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(raw_membership_from_row).collect()
    }
}

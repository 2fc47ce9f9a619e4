use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::authz::{RawEntity, RawMembership};
use crate::errors::AppError;

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, AppError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

/// Entity queries select `id, slug, name, organization_id, workspace_id,
/// project_id`, with NULL for columns the table does not have.
pub fn raw_entity_from_row(entity_type: &str, row: &SqliteRow) -> Result<RawEntity, AppError> {
    let id: String = column(row, "id")?;
    if id.trim().is_empty() {
        return Err(AppError::internal(format!("{} row with empty id", entity_type)));
    }

    Ok(RawEntity {
        entity: entity_type.to_string(),
        id,
        slug: column(row, "slug")?,
        name: column(row, "name")?,
        organization_id: column(row, "organization_id")?,
        workspace_id: column(row, "workspace_id")?,
        project_id: column(row, "project_id")?,
    })
}

pub fn raw_membership_from_row(row: &SqliteRow) -> Result<RawMembership, AppError> {
    let id: String = column(row, "id")?;
    let user_id: String = column(row, "user_id")?;

    Ok(RawMembership {
        id: Some(id),
        user_id: Some(user_id),
        membership_type: column(row, "type")?,
        role: column(row, "role")?,
        organization_id: column(row, "organization_id")?,
        workspace_id: column(row, "workspace_id")?,
        project_id: column(row, "project_id")?,
    })
}

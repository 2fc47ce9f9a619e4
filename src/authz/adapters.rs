//! Normalises persistence-shaped records into [`Subject`] and [`Membership`].
//!
//! This is the only place that knows the raw field names. Records arrive
//! camelCased from the HTTP layer and snake_cased from the row parsers; both
//! land in the same typed structs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::subject::{Ancestors, Membership, Subject};
use crate::errors::AdapterError;

/// Context types with a foreign-key column on raw records.
pub const ANCESTOR_CONTEXTS: [&str; 3] = ["organization", "workspace", "project"];

/// An entity row as the entity store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    /// Type discriminator, e.g. `"project"`.
    pub entity: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl RawEntity {
    pub fn new(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            slug: None,
            name: None,
            organization_id: None,
            workspace_id: None,
            project_id: None,
        }
    }

    fn foreign_keys(&self) -> [Option<&String>; 3] {
        [
            self.organization_id.as_ref(),
            self.workspace_id.as_ref(),
            self.project_id.as_ref(),
        ]
    }
}

/// A membership row as the membership store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMembership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Context type, any case (`"PROJECT"` and `"project"` are the same).
    #[serde(rename = "type")]
    pub membership_type: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl RawMembership {
    pub fn new(membership_type: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: None,
            membership_type: membership_type.into(),
            role: role.into(),
            organization_id: None,
            workspace_id: None,
            project_id: None,
        }
    }

    pub fn context_name(&self) -> String {
        self.membership_type.to_lowercase()
    }

    /// True when one of the foreign keys is `id`.
    pub fn references(&self, id: &str) -> bool {
        [&self.organization_id, &self.workspace_id, &self.project_id]
            .into_iter()
            .any(|key| key.as_deref() == Some(id))
    }

    fn context_key(&self, context: &str) -> Option<&String> {
        match context {
            "organization" => self.organization_id.as_ref(),
            "workspace" => self.workspace_id.as_ref(),
            "project" => self.project_id.as_ref(),
            _ => None,
        }
    }
}

fn ancestors_from(keys: [Option<&String>; 3]) -> Ancestors {
    ANCESTOR_CONTEXTS
        .iter()
        .zip(keys)
        .filter_map(|(context, key)| key.map(|k| (context.to_string(), k.clone())))
        .collect()
}

/// Absent foreign keys simply leave the ancestor entry out.
pub fn adapt_subject(raw: &RawEntity) -> Subject {
    Subject {
        entity_type: raw.entity.clone(),
        key: raw.id.clone(),
        ancestors: ancestors_from(raw.foreign_keys()),
    }
}

pub fn adapt_membership(raw: &RawMembership) -> Result<Membership, AdapterError> {
    let context_name = raw.context_name();
    if !ANCESTOR_CONTEXTS.contains(&context_name.as_str()) {
        return Err(AdapterError::UnknownMembershipType(raw.membership_type.clone()));
    }

    let context_key = raw
        .context_key(&context_name)
        .cloned()
        .ok_or_else(|| AdapterError::MissingContextKey(context_name.clone()))?;

    Ok(Membership {
        context_name,
        context_key,
        role_name: raw.role.clone(),
        ancestors: ancestors_from([
            raw.organization_id.as_ref(),
            raw.workspace_id.as_ref(),
            raw.project_id.as_ref(),
        ]),
    })
}

/// Adapts every row that can be adapted. Rows that cannot are dropped with a
/// warning; a membership that cannot be located in the hierarchy grants nothing.
pub fn adapt_memberships(raws: &[RawMembership]) -> Vec<Membership> {
    raws.iter()
        .filter_map(|raw| match adapt_membership(raw) {
            Ok(m) => Some(m),
            Err(err) => {
                tracing::warn!(
                    membership_id = ?raw.id,
                    error = %err,
                    "skipping membership that cannot be adapted"
                );
                None
            }
        })
        .collect()
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, AdapterError> {
    Ok(serde_path_to_error::deserialize(value)?)
}

pub fn parse_entity(value: Value) -> Result<RawEntity, AdapterError> {
    parse(value)
}

pub fn parse_membership(value: Value) -> Result<RawMembership, AdapterError> {
    parse(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subject_from_task_row() {
        let raw = parse_entity(json!({
            "entity": "task",
            "id": "t1",
            "projectId": "p1",
            "organizationId": "org1"
        }))
        .unwrap();

        let subject = adapt_subject(&raw);
        assert_eq!(subject.entity_type, "task");
        assert_eq!(subject.key, "t1");
        assert_eq!(subject.ancestor("project"), Some("p1"));
        assert_eq!(subject.ancestor("organization"), Some("org1"));
        assert_eq!(subject.ancestor("workspace"), None);
    }

    #[test]
    fn organization_has_no_ancestors() {
        let raw = RawEntity::new("organization", "org1");
        assert!(adapt_subject(&raw).ancestors.is_empty());
    }

    #[test]
    fn membership_key_follows_its_type() {
        let raw = parse_membership(json!({
            "type": "PROJECT",
            "role": "member",
            "organizationId": "org1",
            "projectId": "p1"
        }))
        .unwrap();

        let m = adapt_membership(&raw).unwrap();
        assert_eq!(m.context_name, "project");
        assert_eq!(m.context_key, "p1");
        assert_eq!(m.role_name, "member");
        assert_eq!(m.ancestors.get("organization").map(String::as_str), Some("org1"));
    }

    #[test]
    fn membership_without_its_own_key_is_rejected() {
        let mut raw = RawMembership::new("workspace", "admin");
        raw.organization_id = Some("org1".into());
        assert!(matches!(
            adapt_membership(&raw),
            Err(AdapterError::MissingContextKey(ctx)) if ctx == "workspace"
        ));
    }

    #[test]
    fn membership_of_unknown_type_is_rejected() {
        let raw = RawMembership::new("label", "admin");
        assert!(matches!(
            adapt_membership(&raw),
            Err(AdapterError::UnknownMembershipType(_))
        ));
    }

    #[test]
    fn bad_rows_are_skipped() {
        let mut good = RawMembership::new("organization", "admin");
        good.organization_id = Some("org1".into());
        let bad = RawMembership::new("organization", "admin");

        let adapted = adapt_memberships(&[bad, good]);
        assert_eq!(adapted.len(), 1);
        assert_eq!(adapted[0].context_key, "org1");
    }

    #[test]
    fn shape_errors_carry_the_path() {
        let err = parse_membership(json!({"type": "project", "role": 3})).unwrap_err();
        match err {
            AdapterError::Shape { path, .. } => assert_eq!(path, "role"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn references_checks_every_foreign_key() {
        let mut raw = RawMembership::new("workspace", "admin");
        raw.organization_id = Some("org1".into());
        raw.workspace_id = Some("w1".into());
        assert!(raw.references("w1"));
        assert!(raw.references("org1"));
        assert!(!raw.references("p1"));
    }
}

//! Entity/membership resolution: look an entity up, evaluate the caller's
//! memberships against it, and report the membership that belongs to it.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::adapters::{adapt_memberships, adapt_subject, RawEntity, RawMembership};
use super::evaluator::PermissionManager;
use super::policy::Crud;
use super::principal::RequestScope;
use super::BypassRule;
use crate::errors::{AppError, AppResult};

/// Lookup of entities by id or slug. `Ok(None)` when nothing matches.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn entity_by_id_or_slug(&self, entity_type: &str, id_or_slug: &str) -> AppResult<Option<RawEntity>>;
}

/// Every membership the user currently holds.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn memberships_for_user(&self, user_id: Uuid) -> AppResult<Vec<RawMembership>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The entity type is not on the allowlist; no lookup was attempted.
    UnknownEntityType,
    NotFound,
    NotPermitted,
}

/// Outcome of [`EntityResolver::resolve`]. Denial is data, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub entity: Option<RawEntity>,
    pub allowed: bool,
    /// The caller's membership on this entity, for role display. Reported
    /// whether or not access was granted.
    pub membership: Option<RawMembership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

impl Resolution {
    fn denied(reason: DenialReason) -> Self {
        Self {
            entity: None,
            allowed: false,
            membership: None,
            denial: Some(reason),
        }
    }

    /// The entity and membership if allowed, otherwise `Forbidden`.
    pub fn require(self) -> AppResult<(RawEntity, Option<RawMembership>)> {
        match (self.allowed, self.entity) {
            (true, Some(entity)) => Ok((entity, self.membership)),
            _ => Err(AppError::forbidden(match self.denial {
                Some(DenialReason::UnknownEntityType) => "entity type not accessible",
                Some(DenialReason::NotFound) => "entity not found or not accessible",
                _ => "not permitted",
            })),
        }
    }
}

pub struct EntityResolver {
    manager: Arc<PermissionManager>,
    entities: Arc<dyn EntityStore>,
    entity_types: BTreeSet<String>,
    bypass: BypassRule,
}

impl EntityResolver {
    pub fn new<I, S>(
        manager: Arc<PermissionManager>,
        entities: Arc<dyn EntityStore>,
        entity_types: I,
        bypass: BypassRule,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            manager,
            entities,
            entity_types: entity_types.into_iter().map(Into::into).collect(),
            bypass,
        }
    }

    pub fn bypass(&self) -> BypassRule {
        self.bypass
    }

    pub async fn resolve(
        &self,
        scope: &RequestScope,
        entity_type: &str,
        action: Crud,
        id_or_slug: &str,
    ) -> AppResult<Resolution> {
        if !self.entity_types.contains(entity_type) {
            tracing::warn!(
                user_id = %scope.user.user_id,
                entity_type = %entity_type,
                "entity type not in allowlist"
            );
            return Ok(Resolution::denied(DenialReason::UnknownEntityType));
        }

        let entity = match self.entities.entity_by_id_or_slug(entity_type, id_or_slug).await? {
            Some(entity) if entity.entity == entity_type => entity,
            Some(other) => {
                tracing::warn!(
                    requested = %entity_type,
                    returned = %other.entity,
                    id = %other.id,
                    "entity store returned a different entity type"
                );
                return Ok(Resolution::denied(DenialReason::NotFound));
            }
            None => return Ok(Resolution::denied(DenialReason::NotFound)),
        };

        let subject = adapt_subject(&entity);
        let memberships = adapt_memberships(&scope.memberships);
        let granted = self.manager.is_allowed(&memberships, action, Some(&subject));
        let allowed = self.bypass.apply(granted, &scope.user);

        if allowed != granted {
            tracing::info!(
                user_id = %scope.user.user_id,
                system_role = %scope.user.role,
                bypass = ?self.bypass,
                entity_type = %entity_type,
                id = %entity.id,
                action = %action,
                "system role bypass changed the decision"
            );
        }

        let membership = scope
            .memberships
            .iter()
            .find(|m| m.context_name() == entity_type && m.references(&entity.id))
            .cloned();

        Ok(Resolution {
            entity: Some(entity),
            allowed,
            membership,
            denial: (!allowed).then_some(DenialReason::NotPermitted),
        })
    }
}

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::AppState;
use crate::authz::{
    adapt_memberships, adapt_subject, parse_entity, parse_membership, Crud, CurrentUser, RawEntity, RawMembership,
    RequestScope, Resolution,
};
use crate::errors::{AdapterError, AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub action: Option<String>,
}

impl AccessQuery {
    /// Defaults to `read`; an unknown action is a 400.
    pub fn action(&self) -> AppResult<Crud> {
        match self.action.as_deref() {
            None => Ok(Crud::Read),
            Some(action) => action.parse::<Crud>().map_err(AppError::bad_request),
        }
    }
}

/// Runs the resolution flow for the bearer user. Denial is reported in the
/// body with 200; callers decide what to do with it.
pub async fn resolve_access(
    State(state): State<AppState>,
    scope: RequestScope,
    Path((entity_type, id_or_slug)): Path<(String, String)>,
    Query(query): Query<AccessQuery>,
) -> AppResult<Json<Resolution>> {
    let action = query.action()?;
    let resolution = state
        .resolver
        .resolve(&scope, &entity_type, action, &id_or_slug)
        .await?;
    Ok(Json(resolution))
}

#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub entity: RawEntity,
    pub membership: Option<RawMembership>,
}

/// The entity itself, if the user may read it; 403 otherwise.
pub async fn get_entity(
    State(state): State<AppState>,
    scope: RequestScope,
    Path((entity_type, id_or_slug)): Path<(String, String)>,
) -> AppResult<Json<EntityResponse>> {
    let (entity, membership) = state
        .resolver
        .resolve(&scope, &entity_type, Crud::Read, &id_or_slug)
        .await?
        .require()?;
    Ok(Json(EntityResponse { entity, membership }))
}

#[derive(Debug)]
pub struct CheckRequest {
    pub memberships: Vec<RawMembership>,
    pub action: Crud,
    pub subject: Option<RawEntity>,
}

impl CheckRequest {
    /// Parses `{memberships, action, subject}` record by record so a shape
    /// error names the offending field, e.g. `memberships[1].role`.
    pub fn from_value(mut body: Value) -> Result<Self, AdapterError> {
        let memberships = match body.get_mut("memberships").map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| parse_membership(item).map_err(|e| e.within(&format!("memberships[{i}]"))))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(shape("memberships", "expected an array")),
        };

        let action = match body.get("action").and_then(Value::as_str) {
            Some(action) => action.parse::<Crud>().map_err(|message| shape("action", &message))?,
            None => return Err(shape("action", "expected one of create, read, update, delete")),
        };

        let subject = match body.get_mut("subject").map(Value::take) {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_entity(value).map_err(|e| e.within("subject"))?),
        };

        Ok(Self {
            memberships,
            action,
            subject,
        })
    }
}

fn shape(path: &str, message: &str) -> AdapterError {
    AdapterError::Shape {
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

/// Evaluates caller-supplied memberships against a caller-supplied subject.
/// No lookups and no system-role bypass.
pub async fn check(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<Value>,
) -> AppResult<Json<CheckResponse>> {
    let req = CheckRequest::from_value(body)?;
    let memberships = adapt_memberships(&req.memberships);
    let subject = req.subject.as_ref().map(adapt_subject);
    let allowed = state.authz.is_allowed(&memberships, req.action, subject.as_ref());
    Ok(Json(CheckResponse { allowed }))
}

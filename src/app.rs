use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{EntityResolver, MembershipStore, PermissionManager};
use crate::config::AuthzConfig;
use crate::db::SqliteStore;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{access, health};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub authz: Arc<PermissionManager>,
    pub resolver: Arc<EntityResolver>,
    pub memberships: Arc<dyn MembershipStore>,
}

impl AppState {
    /// Fails when the authorization configuration does not validate.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, authz: &AuthzConfig) -> Result<Self, AppError> {
        let manager = Arc::new(authz.permission_manager()?);
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let resolver = EntityResolver::new(
            manager.clone(),
            store.clone(),
            authz.entity_types.iter().cloned(),
            authz.bypass,
        );

        Ok(Self {
            pool,
            jwt: Arc::new(jwt),
            authz: manager,
            resolver: Arc::new(resolver),
            memberships: store,
        })
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_config = AuthzConfig::from_env()?;
    create_app_with(pool, jwt_config, &authz_config)
}

pub fn create_app_with(pool: SqlitePool, jwt: JwtConfig, authz: &AuthzConfig) -> Result<Router, AppError> {
    let state = AppState::new(pool, jwt, authz)?;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let entity_routes = Router::new()
        .route("/:entity_type/:id_or_slug", get(access::get_entity))
        .route("/:entity_type/:id_or_slug/access", get(access::resolve_access));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/authz/check", post(access::check))
        .nest("/entities", entity_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Request-time failures. Access denial is not one of these inside the engine;
/// only the HTTP layer turns a denied `Resolution` into `Forbidden`.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let error = match &self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::Configuration(_) => "configuration",
            AppError::Token(_) => "token",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        };

        if matches!(self, AppError::Database(_) | AppError::Internal(_)) {
            tracing::error!(error = %message, "request failed");
        }

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<AdapterError> for AppError {
    fn from(value: AdapterError) -> Self {
        Self::BadRequest(value.to_string())
    }
}

/// Startup-time misconfiguration of the context graph, the policy table, or
/// the environment. Always fatal: the process must not serve requests with a
/// table that failed validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("context or product `{0}` is already registered")]
    DuplicateContext(String),
    #[error("`{name}` declares parent `{parent}`, which is not registered")]
    UnknownParent { name: String, parent: String },
    #[error("`{name}` declares product `{parent}` as a parent; products cannot have children")]
    ProductAsParent { name: String, parent: String },
    #[error("context `{0}` must declare at least one role")]
    EmptyRoles(String),
    #[error("policy subject `{0}` is not a registered context or product")]
    UnknownSubject(String),
    #[error("policy for `{subject}` references unknown context `{context}`")]
    UnknownContext { subject: String, context: String },
    #[error("policy for `{subject}` grants through `{context}`, which is a product and has no roles")]
    NotAContext { subject: String, context: String },
    #[error("policy for `{subject}` references role `{role}`, which is not valid for context `{context}`")]
    UnknownRole {
        subject: String,
        context: String,
        role: String,
    },
    #[error("entity type `{0}` in the allowlist is not a registered context or product")]
    UnknownEntityType(String),
    #[error("invalid value `{value}` for {key}")]
    InvalidSetting { key: &'static str, value: String },
    #[error("failed to read policy file {}", .path.display())]
    PolicyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy file {} at `{}`", .path.display(), .source.path())]
    PolicyParse {
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    #[error("unexpected content after the policy in {}", .path.display())]
    PolicyTrailing {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A raw record that cannot be normalised into a canonical value.
#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("membership type `{0}` is not a context with an id column")]
    UnknownMembershipType(String),
    #[error("membership of type `{0}` has no `{0}Id`")]
    MissingContextKey(String),
    #[error("malformed record at `{path}`: {message}")]
    Shape { path: String, message: String },
}

impl AdapterError {
    /// Re-roots a shape error found inside a nested record, e.g. `role`
    /// inside `memberships[0]` becomes `memberships[0].role`.
    pub fn within(self, prefix: &str) -> Self {
        match self {
            AdapterError::Shape { path, message } => {
                let path = if path.is_empty() || path == "." {
                    prefix.to_string()
                } else if path.starts_with('[') {
                    format!("{prefix}{path}")
                } else {
                    format!("{prefix}.{path}")
                };
                AdapterError::Shape { path, message }
            }
            other => other,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for AdapterError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Self::Shape {
            path: value.path().to_string(),
            message: value.inner().to_string(),
        }
    }
}

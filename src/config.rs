use std::fs;
use std::path::{Path, PathBuf};

use crate::authz::{defaults, BypassRule, PermissionManager, PolicyRow, PolicyTableBuilder};
use crate::errors::ConfigError;

/// Authorization settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// JSON policy file; the built-in policy is used when unset.
    pub policy_path: Option<PathBuf>,
    /// Entity types the resolution flow will look up.
    pub entity_types: Vec<String>,
    pub bypass: BypassRule,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            policy_path: None,
            entity_types: defaults::ENTITY_TYPES.iter().map(|s| s.to_string()).collect(),
            bypass: BypassRule::default(),
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthzConfig::from_env`], reading settings through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("AUTHZ_POLICY_PATH") {
            let path = path.trim();
            if !path.is_empty() {
                config.policy_path = Some(PathBuf::from(path));
            }
        }

        if let Some(raw) = lookup("AUTHZ_ENTITY_TYPES") {
            let types: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if types.is_empty() {
                return Err(ConfigError::InvalidSetting {
                    key: "AUTHZ_ENTITY_TYPES",
                    value: raw,
                });
            }
            config.entity_types = types;
        }

        if let Some(bypass) = lookup("AUTHZ_BYPASS") {
            config.bypass = bypass
                .parse()
                .map_err(|_| ConfigError::InvalidSetting { key: "AUTHZ_BYPASS", value: bypass })?;
        }

        Ok(config)
    }

    pub fn policy(&self) -> Result<PolicyTableBuilder, ConfigError> {
        match &self.policy_path {
            Some(path) => Ok(PolicyTableBuilder::default().rows(load_policy_rows(path)?)),
            None => Ok(defaults::policy()),
        }
    }

    /// Builds the permission manager and checks the entity-type allowlist
    /// against its graph. Any error here must abort startup.
    pub fn permission_manager(&self) -> Result<PermissionManager, ConfigError> {
        let manager = PermissionManager::new(defaults::context_graph()?, self.policy()?)?;

        if let Some(unknown) = self
            .entity_types
            .iter()
            .find(|t| !manager.graph().contains(t))
        {
            return Err(ConfigError::UnknownEntityType(unknown.clone()));
        }

        if self.bypass == BypassRule::LegacyInverted {
            tracing::warn!(
                "AUTHZ_BYPASS=legacy-inverted: non-admin users are allowed whenever the resolver denies"
            );
        }

        Ok(manager)
    }
}

/// Reads `[{"subject","context","role","permissions":{...}}, ...]`.
pub fn load_policy_rows(path: &Path) -> Result<Vec<PolicyRow>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::PolicyIo {
        path: path.to_path_buf(),
        source,
    })?;

    let mut de = serde_json::Deserializer::from_str(&text);
    let rows = serde_path_to_error::deserialize(&mut de).map_err(|source| ConfigError::PolicyParse {
        path: path.to_path_buf(),
        source,
    })?;
    de.end().map_err(|source| ConfigError::PolicyTrailing {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rows)
}

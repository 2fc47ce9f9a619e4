use std::collections::{BTreeMap, BTreeSet};

use crate::errors::ConfigError;

/// Whether an entity type carries roles of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    /// Roles are ordered from most to least privileged.
    Context { roles: Vec<String> },
    /// No roles; permission always comes from ancestor contexts.
    Product,
}

#[derive(Debug, Clone)]
struct EntityNode {
    kind: EntityKind,
    ancestors: BTreeSet<String>,
    grantors: BTreeSet<String>,
}

/// Static registry of contexts, products and their parent links.
///
/// Parents must be registered before their children, so the transitive
/// ancestor set of a new node is known at registration time and stored on the
/// node. Nothing walks the graph after startup.
#[derive(Debug, Clone, Default)]
pub struct ContextGraph {
    nodes: BTreeMap<String, EntityNode>,
}

impl ContextGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_context<R, S>(
        &mut self,
        name: &str,
        roles: R,
        parents: &[&str],
    ) -> Result<(), ConfigError>
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            return Err(ConfigError::EmptyRoles(name.to_string()));
        }
        self.insert(name, EntityKind::Context { roles }, parents)
    }

    pub fn register_product(&mut self, name: &str, parents: &[&str]) -> Result<(), ConfigError> {
        self.insert(name, EntityKind::Product, parents)
    }

    fn insert(&mut self, name: &str, kind: EntityKind, parents: &[&str]) -> Result<(), ConfigError> {
        if self.nodes.contains_key(name) {
            return Err(ConfigError::DuplicateContext(name.to_string()));
        }

        let mut ancestors = BTreeSet::new();
        for parent in parents {
            let node = self.nodes.get(*parent).ok_or_else(|| ConfigError::UnknownParent {
                name: name.to_string(),
                parent: parent.to_string(),
            })?;
            if node.kind == EntityKind::Product {
                return Err(ConfigError::ProductAsParent {
                    name: name.to_string(),
                    parent: parent.to_string(),
                });
            }
            ancestors.insert(parent.to_string());
            ancestors.extend(node.ancestors.iter().cloned());
        }

        let mut grantors = ancestors.clone();
        if matches!(kind, EntityKind::Context { .. }) {
            grantors.insert(name.to_string());
        }

        tracing::debug!(
            entity_type = %name,
            ancestors = ?ancestors,
            "registered entity type"
        );

        self.nodes.insert(
            name.to_string(),
            EntityNode {
                kind,
                ancestors,
                grantors,
            },
        );
        Ok(())
    }

    /// Transitive parents of `type_name`. `None` for unregistered types.
    pub fn ancestors_of(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(type_name).map(|n| &n.ancestors)
    }

    /// Contexts whose memberships may grant on a subject of `type_name`:
    /// the type itself when it is a context, plus every ancestor.
    pub fn grantors_of(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(type_name).map(|n| &n.grantors)
    }

    pub fn kind_of(&self, type_name: &str) -> Option<&EntityKind> {
        self.nodes.get(type_name).map(|n| &n.kind)
    }

    pub fn roles_of(&self, type_name: &str) -> Option<&[String]> {
        match self.kind_of(type_name)? {
            EntityKind::Context { roles } => Some(roles.as_slice()),
            EntityKind::Product => None,
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.nodes.contains_key(type_name)
    }

    pub fn is_context(&self, type_name: &str) -> bool {
        matches!(self.kind_of(type_name), Some(EntityKind::Context { .. }))
    }

    pub fn is_product(&self, type_name: &str) -> bool {
        matches!(self.kind_of(type_name), Some(EntityKind::Product))
    }

    pub fn is_valid_role(&self, context: &str, role: &str) -> bool {
        self.roles_of(context)
            .map(|roles| roles.iter().any(|r| r == role))
            .unwrap_or(false)
    }

    /// Registered type names in lexical order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

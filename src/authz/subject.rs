use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ancestor context name -> ancestor instance key.
pub type Ancestors = BTreeMap<String, String>;

/// A concrete resource instance being acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub key: String,
    #[serde(default)]
    pub ancestors: Ancestors,
}

impl Subject {
    pub fn new(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: key.into(),
            ancestors: Ancestors::new(),
        }
    }

    pub fn with_ancestor(mut self, context: impl Into<String>, key: impl Into<String>) -> Self {
        self.ancestors.insert(context.into(), key.into());
        self
    }

    pub fn ancestor(&self, context: &str) -> Option<&str> {
        self.ancestors.get(context).map(String::as_str)
    }
}

/// A role grant scoped to one instance of one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub context_name: String,
    pub context_key: String,
    pub role_name: String,
    #[serde(default)]
    pub ancestors: Ancestors,
}

impl Membership {
    pub fn new(
        context_name: impl Into<String>,
        context_key: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            context_name: context_name.into(),
            context_key: context_key.into(),
            role_name: role_name.into(),
            ancestors: Ancestors::new(),
        }
    }

    pub fn with_ancestor(mut self, context: impl Into<String>, key: impl Into<String>) -> Self {
        self.ancestors.insert(context.into(), key.into());
        self
    }

    /// Whether this membership is scoped to `subject` itself or to one of its
    /// ancestors. A missing ancestor entry on the subject never matches.
    pub fn governs(&self, subject: &Subject) -> bool {
        if self.context_name == subject.entity_type {
            self.context_key == subject.key
        } else {
            subject.ancestor(&self.context_name) == Some(self.context_key.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_level_requires_same_key() {
        let subject = Subject::new("project", "p1").with_ancestor("organization", "org1");
        assert!(Membership::new("project", "p1", "member").governs(&subject));
        assert!(!Membership::new("project", "p2", "member").governs(&subject));
    }

    #[test]
    fn ancestor_level_matches_through_ancestor_map() {
        let subject = Subject::new("project", "p1").with_ancestor("organization", "org1");
        assert!(Membership::new("organization", "org1", "admin").governs(&subject));
        assert!(!Membership::new("organization", "org2", "admin").governs(&subject));
        assert!(!Membership::new("workspace", "org1", "admin").governs(&subject));
    }

    #[test]
    fn bare_subject_only_matches_itself() {
        let subject = Subject::new("project", "p1");
        assert!(Membership::new("project", "p1", "admin").governs(&subject));
        assert!(!Membership::new("organization", "org1", "admin").governs(&subject));
    }
}

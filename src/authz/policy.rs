use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::graph::ContextGraph;
use crate::errors::ConfigError;

/// The four actions a policy grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crud {
    Create,
    Read,
    Update,
    Delete,
}

impl Crud {
    pub const ALL: [Crud; 4] = [Crud::Create, Crud::Read, Crud::Update, Crud::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Crud::Create => "create",
            Crud::Read => "read",
            Crud::Update => "update",
            Crud::Delete => "delete",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Crud::Create => 0b0001,
            Crud::Read => 0b0010,
            Crud::Update => 0b0100,
            Crud::Delete => 0b1000,
        }
    }
}

impl fmt::Display for Crud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Crud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Crud::Create),
            "read" => Ok(Crud::Read),
            "update" => Ok(Crud::Update),
            "delete" => Ok(Crud::Delete),
            other => Err(format!("unknown action `{other}`")),
        }
    }
}

/// CRUD bitmask. Serialised as `{"create":1,"read":1,"update":0,"delete":0}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "PermissionFlags", into = "PermissionFlags")]
pub struct Permissions(u8);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const ALL: Permissions = Permissions(0b1111);

    pub fn from_flags(create: u8, read: u8, update: u8, delete: u8) -> Self {
        let mut bits = 0;
        for (flag, action) in [create, read, update, delete].into_iter().zip(Crud::ALL) {
            if flag != 0 {
                bits |= action.bit();
            }
        }
        Permissions(bits)
    }

    pub fn allows(&self, action: Crud) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in Crud::ALL {
            let c = if self.allows(action) {
                action.as_str().chars().next().unwrap_or('?').to_ascii_uppercase()
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PermissionFlags {
    #[serde(default)]
    create: u8,
    #[serde(default)]
    read: u8,
    #[serde(default)]
    update: u8,
    #[serde(default)]
    delete: u8,
}

impl TryFrom<PermissionFlags> for Permissions {
    type Error = String;

    fn try_from(flags: PermissionFlags) -> Result<Self, Self::Error> {
        let values = [flags.create, flags.read, flags.update, flags.delete];
        if let Some(bad) = values.iter().find(|v| **v > 1) {
            return Err(format!("permission flags must be 0 or 1, got {bad}"));
        }
        Ok(Permissions::from_flags(
            flags.create,
            flags.read,
            flags.update,
            flags.delete,
        ))
    }
}

impl From<Permissions> for PermissionFlags {
    fn from(p: Permissions) -> Self {
        PermissionFlags {
            create: p.allows(Crud::Create) as u8,
            read: p.allows(Crud::Read) as u8,
            update: p.allows(Crud::Update) as u8,
            delete: p.allows(Crud::Delete) as u8,
        }
    }
}

/// One declarative grant: members holding `role` in `context` get
/// `permissions` on subjects of type `subject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub subject: String,
    pub context: String,
    pub role: String,
    pub permissions: Permissions,
}

impl PolicyRow {
    pub fn new(subject: &str, context: &str, role: &str, permissions: Permissions) -> Self {
        Self {
            subject: subject.to_string(),
            context: context.to_string(),
            role: role.to_string(),
            permissions,
        }
    }
}

type GrantKey = (String, String);

/// Validated (subject, context, role) -> bitmask lookup. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    grants: BTreeMap<String, BTreeMap<GrantKey, Permissions>>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// Unconfigured combinations grant nothing.
    pub fn bitmask_for(&self, subject: &str, context: &str, role: &str) -> Permissions {
        self.grants
            .get(subject)
            .and_then(|by_role| by_role.get(&(context.to_string(), role.to_string())))
            .copied()
            .unwrap_or(Permissions::NONE)
    }

    /// Effective rows ordered by subject, context, role.
    pub fn rows(&self) -> impl Iterator<Item = PolicyRow> + '_ {
        self.grants.iter().flat_map(|(subject, by_role)| {
            by_role.iter().map(move |((context, role), permissions)| PolicyRow {
                subject: subject.clone(),
                context: context.clone(),
                role: role.clone(),
                permissions: *permissions,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.grants.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects rows in insertion order and validates them against a graph.
///
/// A later row for the same (subject, context, role) replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct PolicyTableBuilder {
    rows: Vec<PolicyRow>,
}

impl PolicyTableBuilder {
    pub fn row(mut self, row: PolicyRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = PolicyRow>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Configure every grant for one subject type.
    ///
    /// ```
    /// use cella_authz::authz::{Permissions, PolicyTable};
    ///
    /// let builder = PolicyTable::builder().configure("project", |p| {
    ///     p.grant("organization", "admin", Permissions::ALL)
    ///         .grant("project", "member", Permissions::from_flags(0, 1, 0, 0));
    /// });
    /// assert_eq!(builder.pending().len(), 2);
    /// ```
    pub fn configure(mut self, subject: &str, f: impl FnOnce(&mut SubjectPolicy<'_>)) -> Self {
        let mut scope = SubjectPolicy {
            subject,
            rows: &mut self.rows,
        };
        f(&mut scope);
        self
    }

    pub fn pending(&self) -> &[PolicyRow] {
        &self.rows
    }

    pub fn build(self, graph: &ContextGraph) -> Result<PolicyTable, ConfigError> {
        let mut table = PolicyTable::default();

        for row in self.rows {
            validate_row(graph, &row)?;

            let by_role = table.grants.entry(row.subject.clone()).or_default();
            let key = (row.context.clone(), row.role.clone());
            if let Some(previous) = by_role.insert(key, row.permissions) {
                tracing::warn!(
                    subject = %row.subject,
                    context = %row.context,
                    role = %row.role,
                    previous = %previous,
                    current = %row.permissions,
                    "policy grant overwritten by a later row"
                );
            }
        }

        Ok(table)
    }
}

fn validate_row(graph: &ContextGraph, row: &PolicyRow) -> Result<(), ConfigError> {
    if !graph.contains(&row.subject) {
        return Err(ConfigError::UnknownSubject(row.subject.clone()));
    }
    if !graph.contains(&row.context) {
        return Err(ConfigError::UnknownContext {
            subject: row.subject.clone(),
            context: row.context.clone(),
        });
    }
    if !graph.is_context(&row.context) {
        return Err(ConfigError::NotAContext {
            subject: row.subject.clone(),
            context: row.context.clone(),
        });
    }
    if !graph.is_valid_role(&row.context, &row.role) {
        return Err(ConfigError::UnknownRole {
            subject: row.subject.clone(),
            context: row.context.clone(),
            role: row.role.clone(),
        });
    }
    Ok(())
}

/// Grant setter handed to [`PolicyTableBuilder::configure`].
pub struct SubjectPolicy<'a> {
    subject: &'a str,
    rows: &'a mut Vec<PolicyRow>,
}

impl SubjectPolicy<'_> {
    pub fn grant(&mut self, context: &str, role: &str, permissions: Permissions) -> &mut Self {
        self.rows
            .push(PolicyRow::new(self.subject, context, role, permissions));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ContextGraph {
        let mut graph = ContextGraph::new();
        graph.register_context("organization", ["admin", "member"], &[]).unwrap();
        graph
            .register_context("project", ["admin", "member"], &["organization"])
            .unwrap();
        graph.register_product("task", &["project"]).unwrap();
        graph
    }

    #[test]
    fn bitmask_bits() {
        let p = Permissions::from_flags(0, 1, 1, 0);
        assert!(!p.allows(Crud::Create));
        assert!(p.allows(Crud::Read));
        assert!(p.allows(Crud::Update));
        assert!(!p.allows(Crud::Delete));
        assert_eq!(p.to_string(), "-RU-");
        assert_eq!(Permissions::ALL.to_string(), "CRUD");
        assert!(Permissions::NONE.is_empty());
    }

    #[test]
    fn bitmask_serde() {
        let p: Permissions =
            serde_json::from_str(r#"{"create":1,"read":1,"update":0,"delete":1}"#).unwrap();
        assert_eq!(p, Permissions::from_flags(1, 1, 0, 1));
        assert_eq!(
            serde_json::to_value(p).unwrap(),
            serde_json::json!({"create":1,"read":1,"update":0,"delete":1})
        );

        let err = serde_json::from_str::<Permissions>(r#"{"create":2}"#).unwrap_err();
        assert!(err.to_string().contains("0 or 1"));
    }

    #[test]
    fn unconfigured_grants_nothing() {
        let table = PolicyTable::builder()
            .configure("project", |p| {
                p.grant("project", "admin", Permissions::ALL);
            })
            .build(&graph())
            .unwrap();

        assert_eq!(table.bitmask_for("project", "project", "member"), Permissions::NONE);
        assert_eq!(table.bitmask_for("task", "project", "admin"), Permissions::NONE);
        assert_eq!(table.bitmask_for("project", "project", "admin"), Permissions::ALL);
    }

    #[test]
    fn last_write_wins() {
        let table = PolicyTable::builder()
            .configure("task", |p| {
                p.grant("project", "member", Permissions::ALL);
            })
            .row(PolicyRow::new(
                "task",
                "project",
                "member",
                Permissions::from_flags(0, 1, 0, 0),
            ))
            .build(&graph())
            .unwrap();

        assert_eq!(
            table.bitmask_for("task", "project", "member"),
            Permissions::from_flags(0, 1, 0, 0)
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rows_reject_unknown_names() {
        let graph = graph();

        let err = PolicyTable::builder()
            .row(PolicyRow::new("label", "project", "admin", Permissions::ALL))
            .build(&graph)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSubject(_)));

        let err = PolicyTable::builder()
            .row(PolicyRow::new("task", "workspace", "admin", Permissions::ALL))
            .build(&graph)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownContext { .. }));

        let err = PolicyTable::builder()
            .row(PolicyRow::new("task", "project", "owner", Permissions::ALL))
            .build(&graph)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRole { .. }));

        let err = PolicyTable::builder()
            .row(PolicyRow::new("task", "task", "admin", Permissions::ALL))
            .build(&graph)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAContext { .. }));
    }

    #[test]
    fn rows_are_ordered() {
        let table = PolicyTable::builder()
            .configure("task", |p| {
                p.grant("project", "member", Permissions::ALL)
                    .grant("organization", "admin", Permissions::ALL);
            })
            .build(&graph())
            .unwrap();

        let contexts: Vec<_> = table.rows().map(|r| r.context).collect();
        assert_eq!(contexts, vec!["organization", "project"]);
    }

    #[test]
    fn crud_parsing() {
        assert_eq!("Update".parse::<Crud>().unwrap(), Crud::Update);
        assert!("archive".parse::<Crud>().is_err());
    }
}

//! Privilege vocabulary
//!
//! The closed set of privileges understood across dialects, an ordered set of
//! them, and the normalized `(database, schema)` scope key used to pair
//! configured grants with observed ones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A dialect-independent privilege.
///
/// Vendor permission names map onto these members through a fixed table in
/// the connector; anything without a mapping is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    Execute,
    Connect,
    Alter,
    Control,
}

impl Privilege {
    /// All privileges in declaration order.
    #[must_use]
    pub fn all() -> &'static [Privilege] {
        &[
            Privilege::Select,
            Privilege::Insert,
            Privilege::Update,
            Privilege::Delete,
            Privilege::Execute,
            Privilege::Connect,
            Privilege::Alter,
            Privilege::Control,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Execute => "EXECUTE",
            Privilege::Connect => "CONNECT",
            Privilege::Alter => "ALTER",
            Privilege::Control => "CONTROL",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = ParsePrivilegeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Privilege::all()
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParsePrivilegeError(s.to_string()))
    }
}

/// Error parsing a privilege name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePrivilegeError(String);

impl fmt::Display for ParsePrivilegeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown privilege '{}'", self.0)
    }
}

impl std::error::Error for ParsePrivilegeError {}

/// An ordered set of privileges.
///
/// Iteration follows the declaration order of [`Privilege`], so statements and
/// reports derived from a set are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegeSet(BTreeSet<Privilege>);

impl PrivilegeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, privilege: Privilege) -> bool {
        self.0.insert(privilege)
    }

    pub fn remove(&mut self, privilege: Privilege) -> bool {
        self.0.remove(&privilege)
    }

    #[must_use]
    pub fn contains(&self, privilege: Privilege) -> bool {
        self.0.contains(&privilege)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.0.iter().copied()
    }

    /// Privileges in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &PrivilegeSet) -> PrivilegeSet {
        PrivilegeSet(self.0.difference(&other.0).copied().collect())
    }

    #[must_use]
    pub fn union(&self, other: &PrivilegeSet) -> PrivilegeSet {
        PrivilegeSet(self.0.union(&other.0).copied().collect())
    }
}

impl FromIterator<Privilege> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = Privilege>>(iter: I) -> Self {
        PrivilegeSet(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Privilege; N]> for PrivilegeSet {
    fn from(privileges: [Privilege; N]) -> Self {
        privileges.into_iter().collect()
    }
}

impl fmt::Display for PrivilegeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Privilege::as_str).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Maps blank or whitespace-only names to `None`; other values are kept verbatim.
#[must_use]
pub fn normalize_name(value: Option<&str>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v.to_string()),
        _ => None,
    }
}

/// Normalized `(database, schema)` key.
///
/// `None` means unscoped at that level. Non-blank names are compared
/// case-sensitively, matching how the server resolves quoted identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl GrantScope {
    #[must_use]
    pub fn new(database: Option<&str>, schema: Option<&str>) -> Self {
        Self {
            database: normalize_name(database),
            schema: normalize_name(schema),
        }
    }

    #[must_use]
    pub fn database(database: &str) -> Self {
        Self::new(Some(database), None)
    }

    #[must_use]
    pub fn schema(database: &str, schema: &str) -> Self {
        Self::new(Some(database), Some(schema))
    }

    /// Re-apply normalization, for scopes built from raw fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self::new(self.database.as_deref(), self.schema.as_deref())
    }

    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.database.is_none() && self.schema.is_none()
    }
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.database.as_deref().unwrap_or("*"),
            self.schema.as_deref().unwrap_or("*")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_parse_is_case_insensitive() {
        assert_eq!("select".parse::<Privilege>().unwrap(), Privilege::Select);
        assert_eq!(" Control ".parse::<Privilege>().unwrap(), Privilege::Control);
        assert!("TRUNCATE".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_privilege_serde_snake_case() {
        let json = serde_json::to_string(&Privilege::Execute).unwrap();
        assert_eq!(json, "\"execute\"");
    }

    #[test]
    fn test_set_iterates_in_declaration_order() {
        let set = PrivilegeSet::from([Privilege::Control, Privilege::Select, Privilege::Update]);
        let order: Vec<Privilege> = set.iter().collect();
        assert_eq!(
            order,
            vec![Privilege::Select, Privilege::Update, Privilege::Control]
        );
        assert_eq!(set.to_string(), "SELECT, UPDATE, CONTROL");
    }

    #[test]
    fn test_set_difference() {
        let configured = PrivilegeSet::from([Privilege::Select, Privilege::Update]);
        let actual = PrivilegeSet::from([Privilege::Select, Privilege::Insert]);

        assert_eq!(
            configured.difference(&actual),
            PrivilegeSet::from([Privilege::Update])
        );
        assert_eq!(
            actual.difference(&configured),
            PrivilegeSet::from([Privilege::Insert])
        );
    }

    #[test]
    fn test_blank_names_normalize_to_none() {
        assert_eq!(GrantScope::new(Some(""), Some("   ")), GrantScope::default());
        assert_eq!(GrantScope::new(None, None), GrantScope::new(Some("\t"), Some("")));
        assert!(GrantScope::new(Some(" "), None).is_unscoped());

        let raw = GrantScope {
            database: Some("orders".to_string()),
            schema: Some(" ".to_string()),
        };
        assert_eq!(raw.normalized(), GrantScope::database("orders"));
    }

    #[test]
    fn test_non_blank_names_are_case_sensitive() {
        assert_ne!(
            GrantScope::schema("TestDB", "dbo"),
            GrantScope::schema("testdb", "dbo")
        );
        assert_eq!(
            GrantScope::schema("TestDB", "dbo").to_string(),
            "TestDB/dbo"
        );
        assert_eq!(GrantScope::database("TestDB").to_string(), "TestDB/*");
    }
}

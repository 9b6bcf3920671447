//! Library scope: who owns an installed package row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visibility/ownership classification of an installed external library.
///
/// Private libraries belong to the connecting user. Public libraries are
/// shared by every user of the database and require db_owner rights to
/// create or drop. SQL Server reports these as `scope_desc` values in
/// `sys.external_libraries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Private,
    Public,
}

impl Scope {
    /// Scope used when the caller did not ask for one: db_owner installs
    /// shared libraries, everyone else gets a private install.
    pub fn default_for_user(is_db_owner: bool) -> Self {
        if is_db_owner {
            Scope::Public
        } else {
            Scope::Private
        }
    }

    /// The AUTHORIZATION principal used in external library DDL.
    ///
    /// Private libraries omit the clause and default to the current user.
    pub fn authorization(&self) -> Option<&'static str> {
        match self {
            Scope::Private => None,
            Scope::Public => Some("dbo"),
        }
    }

    /// The `scope_desc` value reported by `sys.external_libraries`.
    pub fn scope_desc(&self) -> &'static str {
        match self {
            Scope::Private => "PRIVATE",
            Scope::Public => "PUBLIC",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Private => write!(f, "private"),
            Scope::Public => write!(f, "public"),
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Scope::Private),
            // SQL Server calls the shared scope PUBLIC
            "public" | "shared" => Ok(Scope::Public),
            _ => anyhow::bail!("Unknown scope: {}. Expected private, public, or shared.", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse() {
        assert_eq!("private".parse::<Scope>().unwrap(), Scope::Private);
        assert_eq!("Private".parse::<Scope>().unwrap(), Scope::Private);
        assert_eq!("public".parse::<Scope>().unwrap(), Scope::Public);
        assert_eq!("shared".parse::<Scope>().unwrap(), Scope::Public);
        assert!("global".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::Private.to_string(), "private");
        assert_eq!(Scope::Public.to_string(), "public");
    }

    #[test]
    fn test_scope_default() {
        assert_eq!(Scope::default(), Scope::Private);
    }

    #[test]
    fn test_default_for_user() {
        assert_eq!(Scope::default_for_user(true), Scope::Public);
        assert_eq!(Scope::default_for_user(false), Scope::Private);
    }

    #[test]
    fn test_authorization() {
        assert_eq!(Scope::Private.authorization(), None);
        assert_eq!(Scope::Public.authorization(), Some("dbo"));
    }

    #[test]
    fn test_scope_desc_round_trip() {
        for scope in [Scope::Private, Scope::Public] {
            assert_eq!(scope.scope_desc().parse::<Scope>().unwrap(), scope);
        }
    }
}

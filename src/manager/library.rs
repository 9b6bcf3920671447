//! T-SQL statement builders for external library management.
//!
//! The tracking table for installed packages is `sys.external_libraries`;
//! every statement here either adds, replaces, or removes a row in it.

use crate::scope::Scope;

/// Quote an identifier with brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// CREATE EXTERNAL LIBRARY installing `content` under `name`.
pub fn create_library(name: &str, content: &[u8], scope: Scope) -> String {
    let authorization = match scope.authorization() {
        Some(principal) => format!(" AUTHORIZATION {}", quote_ident(principal)),
        None => String::new(),
    };
    format!(
        "CREATE EXTERNAL LIBRARY {}{} FROM (CONTENT = 0x{}) WITH (LANGUAGE = 'Python');",
        quote_ident(name),
        authorization,
        hex::encode(content)
    )
}

/// ALTER EXTERNAL LIBRARY replacing the content of an existing row in place.
pub fn alter_library(name: &str, content: &[u8]) -> String {
    format!(
        "ALTER EXTERNAL LIBRARY {} SET (CONTENT = 0x{}) WITH (LANGUAGE = 'Python');",
        quote_ident(name),
        hex::encode(content)
    )
}

/// DROP EXTERNAL LIBRARY for one tracked row.
pub fn drop_library(name: &str, scope: Scope) -> String {
    match scope.authorization() {
        Some(principal) => format!(
            "DROP EXTERNAL LIBRARY {} AUTHORIZATION {};",
            quote_ident(name),
            quote_ident(principal)
        ),
        None => format!("DROP EXTERNAL LIBRARY {};", quote_ident(name)),
    }
}

/// Query over the tracking table: one row per installed Python library,
/// columns `name` and `scope_desc`.
pub fn list_libraries() -> String {
    "SELECT name, scope_desc FROM sys.external_libraries WHERE language = 'Python' ORDER BY name;"
        .to_string()
}

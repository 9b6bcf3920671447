//! Remote Python execution through sp_execute_external_script.

pub mod script;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;

use crate::index::normalize_name;
use crate::sql::SqlClient;

/// Runs Python snippets inside the SQL-hosted runtime and returns their
/// `result` value.
pub struct SqlPythonExecutor<'a, C: SqlClient> {
    client: &'a C,
}

impl<'a, C: SqlClient> SqlPythonExecutor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Execute `body` remotely with the given named arguments.
    ///
    /// The body communicates its return value by assigning `result`, which
    /// comes back JSON-decoded. A failure inside the remote runtime — for
    /// example importing a package that is not installed — surfaces as an
    /// error.
    pub async fn execute_script_in_sql(
        &self,
        body: &str,
        args: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let sql = script::wrap_script(body, args);
        debug!("Running remote Python script ({} bytes)", body.len());
        let rows = self
            .client
            .query(&sql)
            .await
            .context("Remote Python execution failed")?;
        let cell = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_deref())
            .context("Remote script produced no result row")?;
        serde_json::from_str(cell).context("Remote script result was not valid JSON")
    }

    /// True when `module` can be imported on the server.
    pub async fn module_exists(&self, module: &str) -> Result<bool> {
        let value = self
            .execute_script_in_sql(&script::import_probe(module), &BTreeMap::new())
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// The `__version__` reported by `module`, if any. Fails when the module
    /// cannot be imported at all.
    pub async fn module_version(&self, module: &str) -> Result<Option<String>> {
        let value = self
            .execute_script_in_sql(&script::version_probe(module), &BTreeMap::new())
            .await?;
        Ok(value.as_str().map(String::from))
    }

    /// Installed distributions on the server, keyed by normalized name.
    pub async fn server_packages(&self) -> Result<BTreeMap<String, String>> {
        let value = self
            .execute_script_in_sql(&script::distribution_listing(), &BTreeMap::new())
            .await?;
        let mut packages = BTreeMap::new();
        if let Some(map) = value.as_object() {
            for (name, version) in map {
                if let Some(version) = version.as_str() {
                    packages.insert(normalize_name(name), version.to_string());
                }
            }
        }
        Ok(packages)
    }

    /// Poke the runtime so freshly created external libraries get unpacked.
    pub async fn materialize_libraries(&self) -> Result<()> {
        self.execute_script_in_sql(&script::noop_probe(), &BTreeMap::new())
            .await
            .map(|_| ())
    }
}

//! Python script wrapping for sp_execute_external_script.
//!
//! All functions here are pure string builders; the executor submits their
//! output through the SQL seam.

use serde_json::Value;
use std::collections::BTreeMap;

/// Column name of the single-cell result set every wrapped script produces.
pub const RESULT_COLUMN: &str = "result_json";

/// Build the T-SQL batch that runs `body` inside the server's Python runtime.
///
/// The body consists of top-level Python statements. It sees its named
/// arguments as global variables and communicates back by assigning
/// `result`; the wrapper serializes that value to JSON in a single-row,
/// single-column result set.
pub fn wrap_script(body: &str, args: &BTreeMap<String, Value>) -> String {
    let program = python_program(body, args);
    format!(
        "EXEC sp_execute_external_script\n    @language = N'Python',\n    @script = N'{}'\nWITH RESULT SETS (({} NVARCHAR(MAX)));",
        escape_sql_string(&program),
        RESULT_COLUMN
    )
}

fn python_program(body: &str, args: &BTreeMap<String, Value>) -> String {
    let args_json = serde_json::to_string(args).unwrap_or_else(|_| String::from("{}"));
    format!(
        "import json\n_args = json.loads({args})\nglobals().update(_args)\nresult = None\n{body}\nimport pandas\nOutputDataSet = pandas.DataFrame({{\"{col}\": [json.dumps(result, default=str)]}})\n",
        args = python_string_literal(&args_json),
        body = body,
        col = RESULT_COLUMN
    )
}

/// Probe whether `module` is importable on the server.
pub fn import_probe(module: &str) -> String {
    format!(
        "import importlib\ntry:\n    importlib.import_module({m})\n    result = True\nexcept ImportError:\n    result = False",
        m = python_string_literal(module)
    )
}

/// Report the `__version__` of `module`. Fails remotely when the module
/// cannot be imported.
pub fn version_probe(module: &str) -> String {
    format!(
        "import importlib\n_mod = importlib.import_module({m})\nresult = getattr(_mod, \"__version__\", None)",
        m = python_string_literal(module)
    )
}

/// Enumerate installed distributions as a name -> version map.
pub fn distribution_listing() -> String {
    "from importlib import metadata\nresult = {d.metadata[\"Name\"]: d.version for d in metadata.distributions() if d.metadata[\"Name\"]}"
        .to_string()
}

/// A script that does nothing but succeed. Running one batch forces the
/// server to materialize any external libraries created since the last run.
pub fn noop_probe() -> String {
    "result = \"ok\"".to_string()
}

/// Double single quotes for embedding in a T-SQL N'...' literal.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render text as a double-quoted Python string literal.
fn python_string_literal(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

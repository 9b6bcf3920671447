pub mod connection;
pub mod executor;
pub mod index;
pub mod manager;
pub mod retry;
pub mod scope;
pub mod sql;

/// Test utilities shared by unit tests.
#[cfg(test)]
pub mod test_utils {
    use crate::sql::SqlRow;

    /// Build a result row from string cells.
    pub fn row(cells: &[&str]) -> SqlRow {
        cells.iter().map(|c| Some((*c).to_string())).collect()
    }

    /// Build a single-row, single-cell result set holding a JSON document,
    /// the shape every wrapped remote script produces.
    pub fn json_result(json: &str) -> Vec<SqlRow> {
        vec![vec![Some(json.to_string())]]
    }
}

//! SQL execution seam.
//!
//! Everything that talks to the server goes through the [`SqlClient`] trait,
//! so the package manager and the Python executor can be driven by mocks in
//! tests and by any transport in production.

mod tds;

use anyhow::Result;
use async_trait::async_trait;

pub use tds::TdsClient;

/// One result row, cells rendered as text. NULL cells are `None`.
pub type SqlRow = Vec<Option<String>>;

/// A connection to the SQL execution context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run a batch that returns no result set. Returns total affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a batch and collect the first result set.
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>>;
}

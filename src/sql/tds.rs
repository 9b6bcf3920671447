//! TDS-backed implementation of [`SqlClient`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tiberius::{Client, ColumnData};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{SqlClient, SqlRow};
use crate::connection::ConnectionInfo;

/// A real connection to SQL Server over TCP.
///
/// The underlying client needs exclusive access per batch, so it sits behind
/// an async mutex and the trait methods take `&self`.
pub struct TdsClient {
    inner: Mutex<Client<Compat<TcpStream>>>,
}

impl TdsClient {
    /// Open a TCP connection and authenticate against the server.
    #[tracing::instrument(skip(info))]
    pub async fn connect(info: &ConnectionInfo) -> Result<Self> {
        let config = info.to_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .with_context(|| format!("Failed to reach SQL Server at {}", info.addr()))?;
        tcp.set_nodelay(true)
            .context("Failed to configure the TCP connection")?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .context("Failed to authenticate against SQL Server")?;
        Ok(Self {
            inner: Mutex::new(client),
        })
    }
}

fn cell_to_string(data: ColumnData<'_>) -> Option<String> {
    match data {
        ColumnData::String(s) => s.map(|s| s.into_owned()),
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|v| v.to_string()),
        // Binary, GUID, numeric and date/time cells are not produced by any
        // query this crate issues.
        _ => None,
    }
}

#[async_trait]
impl SqlClient for TdsClient {
    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!("Executing batch ({} bytes)", sql.len());
        let mut client = self.inner.lock().await;
        let result = client.execute(sql, &[]).await.context("SQL batch failed")?;
        Ok(result.total())
    }

    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        debug!("Running query ({} bytes)", sql.len());
        let mut client = self.inner.lock().await;
        let stream = client
            .simple_query(sql)
            .await
            .context("SQL query failed")?;
        let rows = stream
            .into_first_result()
            .await
            .context("Failed to read result set")?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

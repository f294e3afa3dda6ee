// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Warehouse connectors.
//!
//! A [`Connection`] hands out [`Cursor`]s; a cursor executes one statement and
//! buffers its whole result. [`execute`] drives the acquire, use and release
//! sequence every query function goes through.

pub mod databricks;
pub mod local;

pub use databricks::{DatabricksConnection, DatabricksConnectionFactory};

use crate::error::Result;
use async_trait::async_trait;
use datafusion::arrow::record_batch::RecordBatch;
use log::{debug, warn};
use std::fmt::Debug;

/// A cursor executes statements on a connection.
#[async_trait]
pub trait Cursor: Debug + Send {
    /// Runs `sql` to completion.
    async fn execute(&mut self, sql: &str) -> Result<()>;
    /// Returns every row produced by the last statement.
    async fn fetch_all(&mut self) -> Result<Vec<RecordBatch>>;
    /// Releases the cursor. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}

/// A session with the warehouse.
#[async_trait]
pub trait Connection: Debug + Send + Sync {
    /// The type of the connection.
    fn name(&self) -> String;
    /// Opens a cursor.
    async fn cursor(&self) -> Result<Box<dyn Cursor>>;
    /// Releases the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Creates one connection per request.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Connects, authenticating with `token` when one is given and with the
    /// configured credentials otherwise.
    async fn connect(&self, token: Option<&str>) -> Result<Box<dyn Connection>>;
}

/// Runs `sql` on `connection` and returns every row.
///
/// The cursor and then the connection are closed on every path. The first
/// error wins; a failure while closing after a failed statement is only
/// logged.
pub async fn execute(mut connection: Box<dyn Connection>, sql: &str) -> Result<Vec<RecordBatch>> {
    debug!("Executing on {}: {}", connection.name(), sql);

    let result = match connection.cursor().await {
        Ok(mut cursor) => {
            let fetched = match cursor.execute(sql).await {
                Ok(()) => cursor.fetch_all().await,
                Err(e) => Err(e),
            };
            let closed = cursor.close().await;
            match (fetched, closed) {
                (Ok(batches), Ok(())) => Ok(batches),
                (Ok(_), Err(e)) => Err(e),
                (Err(e), Err(close_error)) => {
                    warn!("Failed to close cursor: {}", close_error);
                    Err(e)
                }
                (Err(e), Ok(())) => Err(e),
            }
        }
        Err(e) => Err(e),
    };

    let closed = connection.close().await;
    match (result, closed) {
        (Ok(batches), Ok(())) => Ok(batches),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(close_error)) => {
            warn!("Failed to close connection: {}", close_error);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::test_util::{raw_batch, MockConnection};

    #[tokio::test]
    async fn execute_closes_cursor_then_connection() -> Result<()> {
        let connection = MockConnection::new(vec![raw_batch()?]);
        let log = connection.log();

        let batches = execute(Box::new(connection), "SELECT 1").await?;
        assert_eq!(2, batches[0].num_rows());

        let log = log.lock().await;
        assert_eq!(vec!["SELECT 1".to_string()], log.executed);
        assert_eq!(vec!["cursor.close", "connection.close"], log.closed);
        Ok(())
    }

    #[tokio::test]
    async fn execute_releases_on_failure() -> Result<()> {
        let connection = MockConnection::failing("Error Connecting to Database");
        let log = connection.log();

        match execute(Box::new(connection), "SELECT 1").await {
            Err(SensorError::Driver(msg)) => assert_eq!("Error Connecting to Database", msg),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            vec!["cursor.close", "connection.close"],
            log.lock().await.closed
        );
        Ok(())
    }
}

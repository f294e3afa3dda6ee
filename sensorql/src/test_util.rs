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

//! Common unit test utility methods

use crate::connectors::{Connection, ConnectionFactory, Cursor};
use crate::error::{Result, SensorError};
use async_trait::async_trait;
use datafusion::arrow::array::{Float64Array, StringArray, TimestampMicrosecondArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `2011-01-01T00:00:00` in microseconds since the epoch.
pub const JAN_1_2011_MICROS: i64 = 1_293_840_000_000_000;

/// The schema of the raw event tables.
pub fn raw_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(
            "EventTime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("TagName", DataType::Utf8, true),
        Field::new("Status", DataType::Utf8, true),
        Field::new("Value", DataType::Float64, true),
    ]))
}

/// Two raw events of tag `TestTag`, one minute apart.
pub fn raw_batch() -> Result<RecordBatch> {
    Ok(RecordBatch::try_new(
        raw_schema(),
        vec![
            Arc::new(TimestampMicrosecondArray::from(vec![
                JAN_1_2011_MICROS,
                JAN_1_2011_MICROS + 60_000_000,
            ])),
            Arc::new(StringArray::from(vec!["TestTag", "TestTag"])),
            Arc::new(StringArray::from(vec!["Good", "Good"])),
            Arc::new(Float64Array::from(vec![1.01, 2.5])),
        ],
    )?)
}

/// Everything a [`MockConnection`] was asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    /// Statements, in execution order.
    pub executed: Vec<String>,
    /// `cursor.close` and `connection.close`, in call order.
    pub closed:   Vec<&'static str>,
}

/// A connection that replays scripted batches, or fails every statement with
/// a driver error.
#[derive(Debug, Clone)]
pub struct MockConnection {
    batches: Vec<RecordBatch>,
    error:   Option<String>,
    log:     Arc<Mutex<CallLog>>,
}

impl MockConnection {
    /// Every statement returns `batches`.
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches,
            error: None,
            log: Arc::new(Mutex::new(CallLog::default())),
        }
    }

    /// Every statement fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new(vec![])
        }
    }

    /// A shared handle on the call log.
    pub fn log(&self) -> Arc<Mutex<CallLog>> {
        self.log.clone()
    }
}

#[derive(Debug)]
struct MockCursor {
    connection: MockConnection,
    fetched:    Option<Vec<RecordBatch>>,
    closed:     bool,
}

#[async_trait]
impl Cursor for MockCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(SensorError::Driver("Cursor is closed".to_string()));
        }
        self.connection.log.lock().await.executed.push(sql.to_string());
        match &self.connection.error {
            Some(message) => Err(SensorError::Driver(message.to_owned())),
            None => {
                self.fetched = Some(self.connection.batches.clone());
                Ok(())
            }
        }
    }

    async fn fetch_all(&mut self) -> Result<Vec<RecordBatch>> {
        self.fetched
            .take()
            .ok_or_else(|| SensorError::Driver("No statement was executed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.connection.log.lock().await.closed.push("cursor.close");
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> String {
        "MockConnection".to_string()
    }

    async fn cursor(&self) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(MockCursor {
            connection: self.clone(),
            fetched:    None,
            closed:     false,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().await.closed.push("connection.close");
        Ok(())
    }
}

/// Hands out clones of one [`MockConnection`] and remembers the tokens it was
/// called with.
#[derive(Debug, Clone)]
pub struct MockConnectionFactory {
    connection:  MockConnection,
    unreachable: Option<String>,
    /// Tokens passed to `connect`, in call order.
    pub tokens:  Arc<Mutex<Vec<Option<String>>>>,
}

impl MockConnectionFactory {
    /// Every connection replays `connection`'s script.
    pub fn new(connection: MockConnection) -> Self {
        Self {
            connection,
            unreachable: None,
            tokens: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Connecting fails with `message`.
    pub fn unreachable(message: &str) -> Self {
        Self {
            unreachable: Some(message.to_string()),
            ..Self::new(MockConnection::new(vec![]))
        }
    }

    /// The call log of the connections handed out.
    pub fn log(&self) -> Arc<Mutex<CallLog>> {
        self.connection.log()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(&self, token: Option<&str>) -> Result<Box<dyn Connection>> {
        self.tokens.lock().await.push(token.map(|t| t.to_string()));
        match &self.unreachable {
            Some(message) => Err(SensorError::Driver(message.to_owned())),
            None => Ok(Box::new(self.connection.clone())),
        }
    }
}

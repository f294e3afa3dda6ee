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

//! A DataFusion-backed test double for the connection traits.
//!
//! It exercises the cursor and connection lifecycle against a real SQL engine
//! over in-memory tables. It speaks DataFusion's dialect, not Spark SQL:
//! backtick identifiers, `from_utc_timestamp`, `PIVOT` and `RANGE_JOIN` hints
//! are all rejected, so statements from
//! [`QueryBuilder`](crate::query::builder::QueryBuilder) cannot run here. Use
//! hand-written ANSI SQL with double-quoted identifiers.

use super::{Connection, Cursor};
use crate::error::{Result, SensorError};
use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::execution::context::ExecutionContext;
use std::collections::HashMap;
use std::sync::Arc;

/// Runs DataFusion SQL against in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct LocalConnection {
    tables: HashMap<String, (SchemaRef, Vec<RecordBatch>)>,
    closed: bool,
}

impl LocalConnection {
    /// Creates a connection without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `batches` under `name`. The schema is taken from the first
    /// batch.
    pub fn register(&mut self, name: &str, batches: Vec<RecordBatch>) -> Result<()> {
        let schema = batches
            .first()
            .map(|batch| batch.schema())
            .ok_or_else(|| {
                SensorError::InvalidParameters(format!("Table {} has no batches", name))
            })?;
        self.register_with_schema(name, schema, batches);
        Ok(())
    }

    /// Registers `batches` under `name` with an explicit schema, which allows
    /// empty tables.
    pub fn register_with_schema(
        &mut self,
        name: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) {
        self.tables.insert(name.to_owned(), (schema, batches));
    }
}

#[derive(Debug)]
struct LocalCursor {
    tables: HashMap<String, (SchemaRef, Vec<RecordBatch>)>,
    result: Option<Vec<RecordBatch>>,
    closed: bool,
}

#[async_trait]
impl Cursor for LocalCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(SensorError::Driver("Cursor is closed".to_string()));
        }
        let mut ctx = ExecutionContext::new();
        for (name, (schema, batches)) in &self.tables {
            let table = MemTable::try_new(schema.clone(), vec![batches.clone()])?;
            ctx.register_table(name.as_str(), Arc::new(table))?;
        }
        let df = ctx.sql(sql).await?;
        self.result = Some(df.collect().await?);
        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<RecordBatch>> {
        self.result
            .take()
            .ok_or_else(|| SensorError::Driver("No statement was executed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.result = None;
        Ok(())
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn name(&self) -> String {
        "LocalConnection".to_string()
    }

    async fn cursor(&self) -> Result<Box<dyn Cursor>> {
        if self.closed {
            return Err(SensorError::Driver("Connection is closed".to_string()));
        }
        Ok(Box::new(LocalCursor {
            tables: self.tables.clone(),
            result: None,
            closed: false,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::execute;
    use crate::query::builder::QueryBuilder;
    use crate::query::parameters::QueryParameters;
    use crate::query::QueryType;
    use crate::test_util::raw_batch;
    use datafusion::arrow;
    use datafusion::assert_batches_eq;

    #[tokio::test]
    async fn local_query() -> Result<()> {
        let mut connection = LocalConnection::new();
        connection.register("events", vec![raw_batch()?])?;

        let batches = execute(
            Box::new(connection),
            r#"SELECT "TagName", "Value" FROM events WHERE "Value" > 2 ORDER BY "Value""#,
        )
        .await?;

        let expected = vec![
            "+---------+-------+",
            "| TagName | Value |",
            "+---------+-------+",
            "| TestTag | 2.5   |",
            "+---------+-------+",
        ];
        assert_batches_eq!(expected, &batches);
        Ok(())
    }

    #[tokio::test]
    async fn closed_connection_refuses_cursors() -> Result<()> {
        let mut connection = LocalConnection::new();
        connection.close().await?;
        assert!(matches!(
            connection.cursor().await,
            Err(SensorError::Driver(_))
        ));
        assert!(connection.register("empty", vec![]).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn spark_statements_are_rejected() -> Result<()> {
        let params = QueryParameters {
            business_unit: "bu".to_string(),
            region: "r".to_string(),
            asset: "a".to_string(),
            data_security_level: "s".to_string(),
            data_type: "float".to_string(),
            tag_names: vec!["TestTag".to_string()],
            start_date: Some("2011-01-01".to_string()),
            end_date: Some("2011-01-02".to_string()),
            include_bad_data: true,
            ..Default::default()
        };
        let sql = QueryBuilder::build(&params, QueryType::Raw)?;

        let mut connection = LocalConnection::new();
        connection.register("a_s_events_float", vec![raw_batch()?])?;
        let same_tables = connection.clone();
        let result = execute(Box::new(connection), &sql).await;
        assert!(matches!(result, Err(SensorError::DataFusion(_))));

        // The same table answers plain SQL.
        let batches = execute(
            Box::new(same_tables),
            r#"SELECT count(*) AS n FROM a_s_events_float WHERE "TagName" IN ('TestTag')"#,
        )
        .await?;
        assert_eq!(1, batches[0].num_rows());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_tables_fail() -> Result<()> {
        let connection = LocalConnection::new();
        let result = execute(Box::new(connection), "SELECT * FROM missing").await;
        assert!(matches!(result, Err(SensorError::DataFusion(_))));
        Ok(())
    }
}

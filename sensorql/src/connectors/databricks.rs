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

//! Databricks SQL warehouse connector built on the SQL Statement Execution
//! REST API.
//!
//! Statements are submitted with the `INLINE` disposition and the
//! `JSON_ARRAY` format, polled until they leave the `PENDING`/`RUNNING`
//! states, and read chunk by chunk through `next_chunk_internal_link`.
//! Every value arrives as a JSON string and is converted according to the
//! result manifest.

use super::{Connection, ConnectionFactory, Cursor};
use crate::configs::DatabricksConfig;
use crate::datetime::parse_timestamp_micros;
use crate::error::{Result, SensorError};
use async_trait::async_trait;
use datafusion::arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements/";

#[derive(Debug, Serialize)]
struct ExecuteStatementRequest<'a> {
    statement:       &'a str,
    warehouse_id:    &'a str,
    wait_timeout:    &'a str,
    on_wait_timeout: &'static str,
    disposition:     &'static str,
    format:          &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message:    Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name:      String,
    #[serde(default)]
    type_name: String,
}

#[derive(Debug, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    schema: ResultSchema,
}

#[derive(Debug, Default, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array:               Vec<Vec<Option<String>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status:       StatementStatus,
    #[serde(default)]
    manifest:     Option<ResultManifest>,
    #[serde(default)]
    result:       Option<ResultData>,
}

/// Maps a Databricks SQL type name onto the Arrow type values are decoded to.
fn arrow_type(type_name: &str) -> DataType {
    match type_name.to_uppercase().as_str() {
        "TIMESTAMP" | "TIMESTAMP_NTZ" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "FLOAT" | "DOUBLE" | "DECIMAL" => DataType::Float64,
        "BYTE" | "SHORT" | "INT" | "LONG" => DataType::Int64,
        "BOOLEAN" => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn to_schema(manifest: &ResultManifest) -> SchemaRef {
    Arc::new(Schema::new(
        manifest
            .schema
            .columns
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(&c.type_name), true))
            .collect(),
    ))
}

fn parse_column<T>(
    values: &[Option<&str>],
    field: &Field,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    values
        .iter()
        .map(|value| match value {
            None => Ok(None),
            Some(v) => parse(v).map(Some).ok_or_else(|| {
                SensorError::Execution(format!(
                    "Unable to read '{}' as {:?} in column {}",
                    v,
                    field.data_type(),
                    field.name()
                ))
            }),
        })
        .collect()
}

/// Decodes one chunk of JSON_ARRAY rows.
fn to_batch(schema: &SchemaRef, rows: &[Vec<Option<String>>]) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let values: Vec<Option<&str>> = rows
                .iter()
                .map(|row| row.get(i).and_then(|v| v.as_deref()))
                .collect();
            let array: ArrayRef = match field.data_type() {
                DataType::Timestamp(_, _) => Arc::new(TimestampMicrosecondArray::from(
                    parse_column(&values, field, |v| parse_timestamp_micros(v).ok())?,
                )),
                DataType::Float64 => Arc::new(Float64Array::from(parse_column(
                    &values,
                    field,
                    |v| v.parse::<f64>().ok(),
                )?)),
                DataType::Int64 => Arc::new(Int64Array::from(parse_column(
                    &values,
                    field,
                    |v| v.parse::<i64>().ok(),
                )?)),
                DataType::Boolean => Arc::new(BooleanArray::from(parse_column(
                    &values,
                    field,
                    |v| v.to_lowercase().parse::<bool>().ok(),
                )?)),
                _ => Arc::new(values.iter().copied().collect::<StringArray>()),
            };
            Ok(array)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Extracts the warehouse's error message from a failed HTTP response body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(ServiceError {
            message: Some(message),
            ..
        }) => message,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => format!("Databricks request failed with status {}", status),
    }
}

fn statement_error(state: StatementState, error: Option<ServiceError>) -> SensorError {
    match error {
        Some(ServiceError {
            message: Some(message),
            ..
        }) => SensorError::Driver(message),
        Some(ServiceError {
            error_code: Some(code),
            ..
        }) => SensorError::Driver(format!("Statement {:?}: {}", state, code)),
        _ => SensorError::Driver(format!("Statement {:?}", state)),
    }
}

/// A session with one SQL warehouse.
#[derive(Debug, Clone)]
pub struct DatabricksConnection {
    client:       reqwest::Client,
    config:       Arc<DatabricksConfig>,
    token:        String,
    warehouse_id: String,
    closed:       bool,
}

impl DatabricksConnection {
    /// Creates a connection authenticated with `token`, or with the configured
    /// access token when `token` is `None`.
    pub fn try_new(config: DatabricksConfig, token: Option<&str>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), Arc::new(config), token)
    }

    fn with_client(
        client: reqwest::Client,
        config: Arc<DatabricksConfig>,
        token: Option<&str>,
    ) -> Result<Self> {
        let token = token
            .map(|t| t.to_string())
            .or_else(|| config.access_token.clone())
            .ok_or_else(|| {
                SensorError::Driver("No access token supplied for Databricks".to_string())
            })?;
        let warehouse_id = config.warehouse_id()?;
        Ok(Self {
            client,
            config,
            token,
            warehouse_id,
            closed: false,
        })
    }
}

#[async_trait]
impl Connection for DatabricksConnection {
    fn name(&self) -> String {
        format!("DatabricksConnection({})", self.config.server_hostname)
    }

    async fn cursor(&self) -> Result<Box<dyn Cursor>> {
        if self.closed {
            return Err(SensorError::Driver("Connection is closed".to_string()));
        }
        Ok(Box::new(DatabricksCursor {
            connection:   self.clone(),
            statement_id: None,
            finished:     true,
            result:       None,
            closed:       false,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Executes statements through the Statement Execution API.
#[derive(Debug)]
pub struct DatabricksCursor {
    connection:   DatabricksConnection,
    statement_id: Option<String>,
    finished:     bool,
    result:       Option<Vec<RecordBatch>>,
    closed:       bool,
}

impl DatabricksCursor {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.connection.config.base_url(), path)
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.connection.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SensorError::Driver(error_message(status, &body)));
        }
        Ok(response.json::<T>().await?)
    }

    async fn poll(&self, statement_id: &str) -> Result<StatementResponse> {
        let url = self.url(&format!("{}{}", STATEMENTS_PATH, statement_id));
        self.call(self.connection.client.get(&url)).await
    }

    async fn read_chunks(
        &self,
        manifest: &ResultManifest,
        first: ResultData,
    ) -> Result<Vec<RecordBatch>> {
        let schema = to_schema(manifest);
        let mut batches = vec![];
        let mut chunk = first;
        loop {
            if !chunk.data_array.is_empty() {
                batches.push(to_batch(&schema, &chunk.data_array)?);
            }
            match chunk.next_chunk_internal_link.take() {
                Some(link) => {
                    debug!("Fetching result chunk {}", link);
                    chunk = self.call(self.connection.client.get(&self.url(&link))).await?;
                }
                None => break,
            }
        }
        if batches.is_empty() {
            batches.push(RecordBatch::new_empty(schema));
        }
        Ok(batches)
    }
}

#[async_trait]
impl Cursor for DatabricksCursor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(SensorError::Driver("Cursor is closed".to_string()));
        }
        let request = ExecuteStatementRequest {
            statement:       sql,
            warehouse_id:    &self.connection.warehouse_id,
            wait_timeout:    &self.connection.config.wait_timeout,
            on_wait_timeout: "CONTINUE",
            disposition:     "INLINE",
            format:          "JSON_ARRAY",
        };
        let mut response: StatementResponse = self
            .call(
                self.connection
                    .client
                    .post(&self.url(STATEMENTS_PATH))
                    .json(&request),
            )
            .await?;
        info!("Submitted statement {}", response.statement_id);
        self.statement_id = Some(response.statement_id.clone());
        self.finished = false;

        while matches!(
            response.status.state,
            StatementState::Pending | StatementState::Running
        ) {
            tokio::time::sleep(self.connection.config.poll_interval).await;
            response = self.poll(&response.statement_id).await?;
        }
        self.finished = true;

        match response.status.state {
            StatementState::Succeeded => {
                let manifest = response.manifest.ok_or_else(|| {
                    SensorError::Driver(format!(
                        "Statement {} returned no manifest",
                        response.statement_id
                    ))
                })?;
                let first = response.result.unwrap_or_default();
                self.result = Some(self.read_chunks(&manifest, first).await?);
                Ok(())
            }
            state => Err(statement_error(state, response.status.error)),
        }
    }

    async fn fetch_all(&mut self) -> Result<Vec<RecordBatch>> {
        self.result
            .take()
            .ok_or_else(|| SensorError::Driver("No statement was executed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.result = None;
        if let (Some(statement_id), false) = (&self.statement_id, self.finished) {
            warn!("Cancelling unfinished statement {}", statement_id);
            let url = self.url(&format!("{}{}/cancel", STATEMENTS_PATH, statement_id));
            self.call::<serde_json::Value>(self.connection.client.post(&url))
                .await?;
        }
        Ok(())
    }
}

/// Opens [`DatabricksConnection`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct DatabricksConnectionFactory {
    client: reqwest::Client,
    config: Arc<DatabricksConfig>,
}

impl DatabricksConnectionFactory {
    /// Creates a factory for `config`.
    pub fn new(config: DatabricksConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    /// Creates a factory from the embedded settings and the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(DatabricksConfig::from_env()?))
    }
}

#[async_trait]
impl ConnectionFactory for DatabricksConnectionFactory {
    async fn connect(&self, token: Option<&str>) -> Result<Box<dyn Connection>> {
        Ok(Box::new(DatabricksConnection::with_client(
            self.client.clone(),
            self.config.clone(),
            token,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Array;
    use datafusion::arrow;
    use datafusion::assert_batches_eq;
    use std::time::Duration;

    fn config() -> DatabricksConfig {
        DatabricksConfig {
            server_hostname: "mock.cloud.databricks.com".to_string(),
            http_path:       "sql/mock/mock-test".to_string(),
            warehouse_id:    None,
            access_token:    None,
            wait_timeout:    "30s".to_string(),
            poll_interval:   Duration::from_millis(10),
        }
    }

    #[test]
    fn succeeded_statement_decodes() -> Result<()> {
        let response: StatementResponse = serde_json::from_str(
            r#"{
                "statement_id": "01ed-92c4",
                "status": {"state": "SUCCEEDED"},
                "manifest": {
                    "format": "JSON_ARRAY",
                    "schema": {
                        "column_count": 4,
                        "columns": [
                            {"name": "EventTime", "type_name": "TIMESTAMP", "position": 0},
                            {"name": "TagName", "type_name": "STRING", "position": 1},
                            {"name": "Value", "type_name": "DOUBLE", "position": 2},
                            {"name": "Count", "type_name": "LONG", "position": 3}
                        ]
                    },
                    "total_chunk_count": 1
                },
                "result": {
                    "chunk_index": 0,
                    "row_offset": 0,
                    "row_count": 2,
                    "data_array": [
                        ["2011-01-01T00:00:00.000Z", "T1", "1.5", "3"],
                        [null, "T2", "NaN", null]
                    ]
                }
            }"#,
        )?;
        assert_eq!(StatementState::Succeeded, response.status.state);

        let manifest = response.manifest.unwrap();
        let schema = to_schema(&manifest);
        assert_eq!(
            &DataType::Timestamp(TimeUnit::Microsecond, None),
            schema.field(0).data_type()
        );

        let batch = to_batch(&schema, &response.result.unwrap().data_array)?;
        let times = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(1_293_840_000_000_000, times.value(0));
        assert!(times.is_null(1));

        let values = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(values.value(1).is_nan());

        let expected = vec![
            "+---------+-------+",
            "| TagName | Count |",
            "+---------+-------+",
            "| T1      | 3     |",
            "| T2      |       |",
            "+---------+-------+",
        ];
        let projected = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                schema.field(1).clone(),
                schema.field(3).clone(),
            ])),
            vec![batch.column(1).clone(), batch.column(3).clone()],
        )?;
        assert_batches_eq!(expected, &[projected]);
        Ok(())
    }

    #[test]
    fn malformed_values_fail() {
        let schema = Arc::new(Schema::new(vec![Field::new("Count", DataType::Int64, true)]));
        let rows = vec![vec![Some("three".to_string())]];
        assert!(matches!(
            to_batch(&schema, &rows),
            Err(SensorError::Execution(_))
        ));
    }

    #[test]
    fn failed_statement_keeps_the_warehouse_message() {
        let status: StatementStatus = serde_json::from_str(
            r#"{"state": "FAILED", "error": {"error_code": "BAD_REQUEST",
                "message": "[TABLE_OR_VIEW_NOT_FOUND] The table cannot be found."}}"#,
        )
        .unwrap();
        let err = statement_error(status.state, status.error);
        assert_eq!(
            "[TABLE_OR_VIEW_NOT_FOUND] The table cannot be found.",
            err.to_string()
        );

        assert_eq!(
            "Invalid access token.",
            error_message(
                reqwest::StatusCode::FORBIDDEN,
                r#"{"error_code":"403","message":"Invalid access token."}"#
            )
        );
        assert_eq!(
            "Databricks request failed with status 502 Bad Gateway",
            error_message(reqwest::StatusCode::BAD_GATEWAY, "")
        );
    }

    #[test]
    fn type_mapping() {
        assert_eq!(DataType::Int64, arrow_type("int"));
        assert_eq!(DataType::Float64, arrow_type("DECIMAL"));
        assert_eq!(DataType::Boolean, arrow_type("BOOLEAN"));
        assert_eq!(DataType::Utf8, arrow_type("ARRAY"));
    }

    #[tokio::test]
    async fn connections_need_a_token() -> Result<()> {
        assert!(matches!(
            DatabricksConnection::try_new(config(), None),
            Err(SensorError::Driver(_))
        ));

        let factory = DatabricksConnectionFactory::new(config());
        let connection = factory.connect(Some("mock_databricks_token")).await?;
        assert_eq!(
            "DatabricksConnection(mock.cloud.databricks.com)",
            connection.name()
        );

        let mut configured = config();
        configured.access_token = Some("configured".to_string());
        let connection = DatabricksConnection::try_new(configured, None)?;
        assert_eq!("configured", connection.token);
        assert_eq!("mock-test", connection.warehouse_id);
        Ok(())
    }
}
